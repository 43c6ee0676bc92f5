//! Fixed phase/step tables per workflow type.
//!
//! A workflow type is a name plus an ordered list of phases, each with an
//! ordered list of steps, plus the filesystem entity mappings the detector
//! uses to discover new entities for that type. New workflow types are added
//! by registering a schema; the store and the rule engine never change.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::detector::EntityMapping;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseDef {
    pub id: String,
    pub name: String,
    pub steps: Vec<String>,
}

impl PhaseDef {
    pub fn new(id: &str, name: &str, steps: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            steps: steps.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSchema {
    pub workflow_type: String,
    pub phases: Vec<PhaseDef>,
    #[serde(default)]
    pub entities: Vec<EntityMapping>,
}

impl WorkflowSchema {
    pub fn new(workflow_type: impl Into<String>, phases: Vec<PhaseDef>) -> Self {
        Self {
            workflow_type: workflow_type.into(),
            phases,
            entities: Vec::new(),
        }
    }

    pub fn with_entities(mut self, entities: Vec<EntityMapping>) -> Self {
        self.entities = entities;
        self
    }

    pub fn phase(&self, id: &str) -> Option<&PhaseDef> {
        self.phases.iter().find(|p| p.id == id)
    }

    pub fn phase_ids(&self) -> impl Iterator<Item = &str> {
        self.phases.iter().map(|p| p.id.as_str())
    }

    pub fn first_phase(&self) -> Option<&PhaseDef> {
        self.phases.first()
    }

    /// The phase that follows `id`, or `None` for the last phase.
    pub fn next_phase(&self, id: &str) -> Option<&PhaseDef> {
        let idx = self.phases.iter().position(|p| p.id == id)?;
        self.phases.get(idx + 1)
    }
}

/// Lookup table from `workflowType` to its schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, WorkflowSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in `project` and `goal` types.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(crate::project::schema());
        registry.register(crate::goal::schema());
        registry
    }

    /// Add or replace a schema.
    pub fn register(&mut self, schema: WorkflowSchema) {
        self.schemas.insert(schema.workflow_type.clone(), schema);
    }

    pub fn get(&self, workflow_type: &str) -> Result<&WorkflowSchema> {
        self.schemas
            .get(workflow_type)
            .ok_or_else(|| Error::UnknownWorkflowType(workflow_type.to_string()))
    }

    pub fn workflow_types(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}
