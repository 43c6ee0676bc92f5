//! Project tracking workflow.
//!
//! A project moves through initialization, goal development, execution and
//! completion. Its payload tracks goal ids by stage, counts hand-offs to
//! downstream workflows, and lists task workflows that are currently active.
//! Goal and workflow existence is reconciled from the project directory:
//!
//! ```text
//! <project>/
//!   02-goals-and-roadmap/potential-goals/<id>.md
//!   02-goals-and-roadmap/selected-goals/<id>/
//!   temp/workflows/<id>/
//! ```

mod legacy;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::detector::{EntityMapping, IdSource};
use crate::workflow::{PhaseDef, WorkflowSchema, WorkflowState};

pub use legacy::{read_legacy, write_legacy, LegacyProjectState};

pub const WORKFLOW_TYPE: &str = "project";

pub type ProjectState = WorkflowState<ProjectCustomData>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoalLists {
    pub potential: Vec<String>,
    pub selected: Vec<String>,
    pub completed: Vec<String>,
    pub archived: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Integrations {
    /// Goals handed to a spec-driven workflow.
    pub spec_driven: u32,
    /// Task-executor workflows started from this project.
    pub task_executor: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integration {
    SpecDriven,
    TaskExecutor,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectCustomData {
    pub goals: GoalLists,
    pub integrations: Integrations,
    pub active_workflows: Vec<String>,
    /// Fields this version does not know about, kept so a round trip
    /// through the typed payload does not drop them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProjectCustomData {
    /// Move a potential goal into the selected list. Returns false if `id`
    /// is not a potential goal.
    pub fn select_goal(&mut self, id: &str) -> bool {
        if !remove(&mut self.goals.potential, id) {
            return false;
        }
        push_unique(&mut self.goals.selected, id);
        true
    }

    /// Move a selected goal into the completed list. Returns false if `id`
    /// is not selected.
    pub fn complete_goal(&mut self, id: &str) -> bool {
        if !remove(&mut self.goals.selected, id) {
            return false;
        }
        push_unique(&mut self.goals.completed, id);
        true
    }

    /// Take a goal out of every active list and record it as archived.
    ///
    /// This is the only way a tracked goal leaves the active lists; the
    /// reconciler excludes archived ids, so the goal stays archived while
    /// its files remain on disk. Returns false if the goal was not tracked.
    pub fn archive_goal(&mut self, id: &str) -> bool {
        let goals = &mut self.goals;
        let tracked = remove(&mut goals.potential, id) | remove(&mut goals.selected, id) | remove(&mut goals.completed, id);
        if !tracked {
            return goals.archived.iter().any(|g| g == id);
        }
        push_unique(&mut goals.archived, id);
        true
    }

    pub fn record_integration(&mut self, kind: Integration) -> u32 {
        let counter = match kind {
            Integration::SpecDriven => &mut self.integrations.spec_driven,
            Integration::TaskExecutor => &mut self.integrations.task_executor,
        };
        *counter += 1;
        *counter
    }
}

fn remove(list: &mut Vec<String>, id: &str) -> bool {
    let before = list.len();
    list.retain(|g| g != id);
    list.len() != before
}

fn push_unique(list: &mut Vec<String>, id: &str) {
    if !list.iter().any(|g| g == id) {
        list.push(id.to_string());
    }
}

pub fn schema() -> WorkflowSchema {
    WorkflowSchema::new(
        WORKFLOW_TYPE,
        vec![
            PhaseDef::new(
                "initialization",
                "Initialization",
                &["create-structure", "define-scope", "identify-stakeholders"],
            ),
            PhaseDef::new(
                "goal-development",
                "Goal Development",
                &["brainstorm-goals", "evaluate-goals", "select-goals"],
            ),
            PhaseDef::new("execution", "Execution", &["hand-off-goals", "track-progress"]),
            PhaseDef::new("completion", "Completion", &["verify-outcomes", "archive-project"]),
        ],
    )
    .with_entities(vec![
        EntityMapping::new(
            "selected-goal",
            "02-goals-and-roadmap/selected-goals/*",
            "goals.selected",
            IdSource::DirName,
        )
        .excluding(&["goals.completed", "goals.archived"]),
        EntityMapping::new(
            "potential-goal",
            "02-goals-and-roadmap/potential-goals/*.md",
            "goals.potential",
            IdSource::FileStem,
        )
        .excluding(&["goals.selected", "goals.completed", "goals.archived"]),
        EntityMapping::new("workflow", "temp/workflows/*", "activeWorkflows", IdSource::DirName),
    ])
}
