//! The persisted workflow snapshot and its phase/step transitions.
//!
//! `WorkflowState<T>` is generic over the workflow-specific payload stored in
//! `customData`. Transitions are validated against the step ordering rules in
//! [`StepStatus::can_transition`] and the phase order in the schema:
//!
//! pending -> in-progress -> complete, one phase at a time, never backwards.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

use super::schema::WorkflowSchema;
use super::types::{PhaseInfo, PhaseStatus, StepInfo, StepStatus};

pub const STATE_VERSION: u32 = 1;

/// Snapshot of one workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState<T> {
    pub version: u32,
    /// Bumped on every successful write; used for compare-and-swap.
    #[serde(default)]
    pub revision: u64,
    pub workflow_type: String,
    pub name: String,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub current_phase: String,
    #[serde(default)]
    pub current_step: String,
    pub phases: BTreeMap<String, PhaseInfo>,
    pub custom_data: T,
}

/// Step completion summary across all phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub skipped: usize,
    pub total: usize,
}

impl Progress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (((self.completed + self.skipped) * 100) / self.total) as u8
    }
}

impl<T> WorkflowState<T> {
    /// Build the initial snapshot for `schema`: first phase and its first
    /// step in progress, everything else pending.
    pub fn new(schema: &WorkflowSchema, name: impl Into<String>, custom_data: T) -> Result<Self> {
        let first = schema
            .first_phase()
            .ok_or_else(|| Error::Validation(format!("workflow type '{}' has no phases", schema.workflow_type)))?;
        let now = Utc::now();

        let mut phases = BTreeMap::new();
        for def in &schema.phases {
            phases.insert(
                def.id.clone(),
                PhaseInfo {
                    status: PhaseStatus::Pending,
                    started_at: None,
                    completed_at: None,
                    steps: def.steps.iter().map(StepInfo::pending).collect(),
                },
            );
        }

        let mut state = Self {
            version: STATE_VERSION,
            revision: 0,
            workflow_type: schema.workflow_type.clone(),
            name: name.into(),
            created: now,
            last_updated: now,
            current_phase: first.id.clone(),
            current_step: String::new(),
            phases,
            custom_data,
        };
        state.enter_phase(&first.id, now);
        Ok(state)
    }

    pub fn phase(&self, id: &str) -> Option<&PhaseInfo> {
        self.phases.get(id)
    }

    pub fn current_phase_info(&self) -> Option<&PhaseInfo> {
        self.phases.get(&self.current_phase)
    }

    /// Mark `step` of the current phase as in progress and make it current.
    pub fn start_step(&mut self, step: &str) -> Result<()> {
        self.move_step(step, StepStatus::InProgress)?;
        self.current_step = step.to_string();
        Ok(())
    }

    /// Mark `step` complete. Completing the current step promotes the next
    /// pending step of the phase.
    pub fn complete_step(&mut self, step: &str) -> Result<()> {
        self.finish_step(step, StepStatus::Complete)
    }

    /// Mark `step` skipped. Same promotion rule as [`complete_step`](Self::complete_step).
    pub fn skip_step(&mut self, step: &str) -> Result<()> {
        self.finish_step(step, StepStatus::Skipped)
    }

    /// Close the current phase and enter the next one.
    ///
    /// Refuses while steps are open unless `force`, in which case open steps
    /// are marked skipped. Returns the id of the phase entered, or `None` when
    /// the last phase was closed.
    pub fn advance_phase(&mut self, schema: &WorkflowSchema, force: bool) -> Result<Option<String>> {
        let now = Utc::now();
        let current = self.current_phase.clone();
        let phase = self
            .phases
            .get_mut(&current)
            .ok_or_else(|| Error::UnknownPhase(current.clone()))?;

        if phase.status == PhaseStatus::Complete {
            return Ok(None);
        }

        let open = phase.open_steps();
        if !open.is_empty() && !force {
            return Err(Error::PhaseIncomplete { phase: current, open });
        }
        for step in phase.steps.iter_mut().filter(|s| !s.status.is_terminal()) {
            step.status = StepStatus::Skipped;
            step.completed_at = Some(now);
        }
        phase.status = PhaseStatus::Complete;
        phase.completed_at = Some(now);

        let Some(next) = schema.next_phase(&current) else {
            self.current_step = String::new();
            return Ok(None);
        };
        let next_id = next.id.clone();
        if !self.phases.contains_key(&next_id) {
            return Err(Error::UnknownPhase(next_id));
        }
        self.current_phase = next_id.clone();
        self.enter_phase(&next_id, now);
        Ok(Some(next_id))
    }

    /// True once every phase is complete.
    pub fn is_complete(&self) -> bool {
        self.phases.values().all(|p| p.status == PhaseStatus::Complete)
    }

    pub fn progress(&self) -> Progress {
        let steps = self.phases.values().flat_map(|p| p.steps.iter());
        let mut progress = Progress {
            completed: 0,
            skipped: 0,
            total: 0,
        };
        for step in steps {
            progress.total += 1;
            match step.status {
                StepStatus::Complete => progress.completed += 1,
                StepStatus::Skipped => progress.skipped += 1,
                _ => {}
            }
        }
        progress
    }

    /// Verify the structural invariants of a snapshot against its schema.
    pub fn check_invariants(&self, schema: &WorkflowSchema) -> std::result::Result<(), String> {
        if self.workflow_type != schema.workflow_type {
            return Err(format!(
                "workflowType '{}' does not match '{}'",
                self.workflow_type, schema.workflow_type
            ));
        }

        let expected: BTreeSet<&str> = schema.phase_ids().collect();
        let actual: BTreeSet<&str> = self.phases.keys().map(String::as_str).collect();
        if let Some(missing) = expected.difference(&actual).next() {
            return Err(format!("missing phase '{}'", missing));
        }
        if let Some(extra) = actual.difference(&expected).next() {
            return Err(format!("unexpected phase '{}'", extra));
        }

        let current = self
            .phases
            .get(&self.current_phase)
            .ok_or_else(|| format!("currentPhase '{}' is not a known phase", self.current_phase))?;
        if current.status == PhaseStatus::Pending {
            return Err(format!("currentPhase '{}' is still pending", self.current_phase));
        }
        for def in &schema.phases {
            let Some(info) = self.phases.get(&def.id) else {
                continue;
            };
            let names: Vec<&str> = info.steps.iter().map(|s| s.name.as_str()).collect();
            if names != def.steps.iter().map(String::as_str).collect::<Vec<_>>() {
                return Err(format!(
                    "steps of phase '{}' are [{}], expected [{}]",
                    def.id,
                    names.join(", "),
                    def.steps.join(", ")
                ));
            }
        }

        if !self.current_step.is_empty() && current.step(&self.current_step).is_none() {
            return Err(format!(
                "currentStep '{}' is not a step of phase '{}'",
                self.current_step, self.current_phase
            ));
        }
        Ok(())
    }

    /// Check that no phase or step has moved backwards relative to
    /// `previous`, the phase map of an earlier snapshot of this instance.
    pub fn check_progress_from(&self, previous: &BTreeMap<String, PhaseInfo>) -> Result<()> {
        for (id, before) in previous {
            let Some(after) = self.phases.get(id) else {
                continue;
            };
            if !before.status.can_become(after.status) {
                return Err(Error::InvalidPhaseTransition {
                    phase: id.clone(),
                    from: before.status.to_string(),
                    to: after.status.to_string(),
                });
            }
            for old in &before.steps {
                let Some(new) = after.step(&old.name) else {
                    continue;
                };
                if new.status != old.status && !old.status.can_transition(new.status) {
                    return Err(Error::InvalidStepTransition {
                        step: old.name.clone(),
                        from: old.status.to_string(),
                        to: new.status.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn enter_phase(&mut self, id: &str, now: DateTime<Utc>) {
        let Some(phase) = self.phases.get_mut(id) else {
            return;
        };
        phase.status = PhaseStatus::InProgress;
        phase.started_at = Some(now);
        self.current_step = String::new();
        if let Some(step) = phase.steps.iter_mut().find(|s| s.status == StepStatus::Pending) {
            step.status = StepStatus::InProgress;
            step.started_at = Some(now);
            self.current_step = step.name.clone();
        }
    }

    fn finish_step(&mut self, step: &str, target: StepStatus) -> Result<()> {
        self.move_step(step, target)?;
        if self.current_step != step {
            return Ok(());
        }

        let now = Utc::now();
        self.current_step = String::new();
        if let Some(phase) = self.phases.get_mut(&self.current_phase) {
            if let Some(next) = phase.steps.iter_mut().find(|s| s.status == StepStatus::Pending) {
                next.status = StepStatus::InProgress;
                next.started_at = Some(now);
                self.current_step = next.name.clone();
            }
        }
        Ok(())
    }

    fn move_step(&mut self, step: &str, target: StepStatus) -> Result<()> {
        let phase = self
            .phases
            .get_mut(&self.current_phase)
            .ok_or_else(|| Error::UnknownPhase(self.current_phase.clone()))?;
        let info = phase
            .step_mut(step)
            .ok_or_else(|| Error::UnknownStep(step.to_string()))?;

        if !info.status.can_transition(target) {
            return Err(Error::InvalidStepTransition {
                step: step.to_string(),
                from: info.status.to_string(),
                to: target.to_string(),
            });
        }

        let now = Utc::now();
        if target == StepStatus::InProgress || info.started_at.is_none() {
            info.started_at = Some(now);
        }
        if target.is_terminal() {
            info.completed_at = Some(now);
        }
        info.status = target;
        Ok(())
    }
}

impl<T: Serialize> WorkflowState<T> {
    /// Serialise to a JSON value for field resolution and rule evaluation.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Reinterpret the snapshot with a different payload type.
    ///
    /// Compatibility is structural: any payload whose JSON shape deserialises
    /// as `U` converts, regardless of the Rust type it was written with.
    pub fn reinterpret<U: DeserializeOwned>(&self) -> Result<WorkflowState<U>> {
        Ok(serde_json::from_value(self.to_value()?)?)
    }
}
