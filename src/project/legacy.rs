//! Flat project snapshot used before the generic workflow model.
//!
//! Older callers expect `projectName` at the top level and goal lists
//! beside the phase map instead of inside `customData`. Both accessors are
//! built on the generic store, so legacy and generic readers see the same
//! file.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::store::StateStore;
use crate::workflow::{PhaseInfo, STATE_VERSION};
use crate::Result;

use super::{GoalLists, Integrations, ProjectCustomData, ProjectState, WORKFLOW_TYPE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyProjectState {
    pub version: u32,
    pub project_name: String,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub current_phase: String,
    #[serde(default)]
    pub current_step: String,
    pub phases: BTreeMap<String, PhaseInfo>,
    #[serde(default)]
    pub goals: GoalLists,
    #[serde(default)]
    pub integrations: Integrations,
    #[serde(default)]
    pub active_workflows: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<ProjectState> for LegacyProjectState {
    fn from(state: ProjectState) -> Self {
        let data = state.custom_data;
        Self {
            version: state.version,
            project_name: state.name,
            created: state.created,
            last_updated: state.last_updated,
            current_phase: state.current_phase,
            current_step: state.current_step,
            phases: state.phases,
            goals: data.goals,
            integrations: data.integrations,
            active_workflows: data.active_workflows,
            extra: data.extra,
        }
    }
}

impl From<LegacyProjectState> for ProjectState {
    fn from(legacy: LegacyProjectState) -> Self {
        Self {
            version: legacy.version.max(STATE_VERSION),
            revision: 0,
            workflow_type: WORKFLOW_TYPE.to_string(),
            name: legacy.project_name,
            created: legacy.created,
            last_updated: legacy.last_updated,
            current_phase: legacy.current_phase,
            current_step: legacy.current_step,
            phases: legacy.phases,
            custom_data: ProjectCustomData {
                goals: legacy.goals,
                integrations: legacy.integrations,
                active_workflows: legacy.active_workflows,
                extra: legacy.extra,
            },
        }
    }
}

/// Read the snapshot of `id` in the legacy shape.
pub fn read_legacy(store: &StateStore<ProjectCustomData>, id: impl AsRef<Path>) -> Result<LegacyProjectState> {
    store.read(id).map(LegacyProjectState::from)
}

/// Write a legacy-shaped snapshot to `id`.
///
/// An existing snapshot is replaced through [`StateStore::update`], so the
/// write participates in the same revision check as any other writer and
/// the original creation time is kept.
pub fn write_legacy(
    store: &StateStore<ProjectCustomData>,
    id: impl AsRef<Path>,
    legacy: &LegacyProjectState,
) -> Result<ProjectState> {
    let id = id.as_ref();
    if !store.exists(id) {
        let mut state = ProjectState::from(legacy.clone());
        store.write(id, &mut state)?;
        return Ok(state);
    }
    store.update(id, |current| {
        let mut next = ProjectState::from(legacy.clone());
        next.revision = current.revision;
        next.created = current.created;
        Ok(next)
    })
}
