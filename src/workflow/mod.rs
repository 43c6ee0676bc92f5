//! Generic workflow state model.
//!
//! This module provides the snapshot type shared by every workflow type,
//! the phase/step status types, and the per-type schema table that fixes
//! which phases and steps an instance has.

mod schema;
mod state;
mod types;

pub use schema::{PhaseDef, SchemaRegistry, WorkflowSchema};
pub use state::{Progress, WorkflowState, STATE_VERSION};
pub use types::{PhaseInfo, PhaseStatus, StepInfo, StepStatus};
