//! Per-goal workflow.
//!
//! A goal selected by a project is planned, specified, executed and
//! reviewed in its own directory. Specs and task files on disk are the
//! ground truth for which specs and tasks exist:
//!
//! ```text
//! <goal>/specs/<id>.md
//! <goal>/tasks/<id>.md
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::detector::{EntityMapping, IdSource};
use crate::workflow::{PhaseDef, WorkflowSchema, WorkflowState};

pub const WORKFLOW_TYPE: &str = "goal";

pub type GoalState = WorkflowState<GoalCustomData>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskLists {
    pub open: Vec<String>,
    pub done: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoalCustomData {
    /// Project the goal was selected from, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_project: Option<String>,
    pub specs: Vec<String>,
    pub tasks: TaskLists,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GoalCustomData {
    /// Move an open task to done. Returns false if `id` is not open.
    pub fn finish_task(&mut self, id: &str) -> bool {
        let before = self.tasks.open.len();
        self.tasks.open.retain(|t| t != id);
        if self.tasks.open.len() == before {
            return false;
        }
        if !self.tasks.done.iter().any(|t| t == id) {
            self.tasks.done.push(id.to_string());
        }
        true
    }
}

pub fn schema() -> WorkflowSchema {
    WorkflowSchema::new(
        WORKFLOW_TYPE,
        vec![
            PhaseDef::new("planning", "Planning", &["define-outcome", "estimate"]),
            PhaseDef::new("specification", "Specification", &["write-spec", "review-spec"]),
            PhaseDef::new("execution", "Execution", &["create-tasks", "implement", "test"]),
            PhaseDef::new("review", "Review", &["verify", "retrospective"]),
        ],
    )
    .with_entities(vec![
        EntityMapping::new("spec", "specs/*.md", "specs", IdSource::FileStem),
        EntityMapping::new("task", "tasks/*.md", "tasks.open", IdSource::FileStem).excluding(&["tasks.done"]),
    ])
}
