//! Phase and step progress types shared by every workflow type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a phase in a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseStatus {
    /// Not yet reached
    #[default]
    Pending,
    /// The phase `currentPhase` points at
    InProgress,
    /// Finished; never reopened
    Complete,
}

impl PhaseStatus {
    /// Whether moving from `self` to `target` keeps the phase where it is
    /// or moves it forward.
    pub fn can_become(&self, target: PhaseStatus) -> bool {
        target.order() >= self.order()
    }

    fn order(&self) -> u8 {
        match self {
            PhaseStatus::Pending => 0,
            PhaseStatus::InProgress => 1,
            PhaseStatus::Complete => 2,
        }
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseStatus::Pending => write!(f, "pending"),
            PhaseStatus::InProgress => write!(f, "in-progress"),
            PhaseStatus::Complete => write!(f, "complete"),
        }
    }
}

/// Status of a single step within a phase.
///
/// Steps only move forward: `Pending -> InProgress -> (Complete | Skipped)`.
/// A pending step may also be completed or skipped directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Complete,
    Skipped,
}

impl StepStatus {
    /// Whether the step has reached a final status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Complete | StepStatus::Skipped)
    }

    /// Check whether moving from `self` to `target` is a forward transition.
    pub fn can_transition(&self, target: StepStatus) -> bool {
        matches!(
            (self, target),
            (StepStatus::Pending, StepStatus::InProgress)
                | (StepStatus::Pending, StepStatus::Complete)
                | (StepStatus::Pending, StepStatus::Skipped)
                | (StepStatus::InProgress, StepStatus::Complete)
                | (StepStatus::InProgress, StepStatus::Skipped)
        )
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::InProgress => write!(f, "in-progress"),
            StepStatus::Complete => write!(f, "complete"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepInfo {
    pub name: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepInfo {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseInfo {
    pub status: PhaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub steps: Vec<StepInfo>,
}

impl PhaseInfo {
    pub fn step(&self, name: &str) -> Option<&StepInfo> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn step_mut(&mut self, name: &str) -> Option<&mut StepInfo> {
        self.steps.iter_mut().find(|s| s.name == name)
    }

    /// Names of steps that are not yet complete or skipped.
    pub fn open_steps(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter(|s| !s.status.is_terminal())
            .map(|s| s.name.clone())
            .collect()
    }
}
