use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Glob pattern error: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("State not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Invalid state at {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },

    #[error("State already exists: {}", .0.display())]
    StateExists(PathBuf),

    #[error("State was modified concurrently (expected revision {expected}, found {found})")]
    RevisionConflict { expected: u64, found: u64 },

    #[error("State is locked by another writer: {}", .0.display())]
    Locked(PathBuf),

    #[error("Failed to load rules from {source_name}: {reason}")]
    RuleLoad { source_name: String, reason: String },

    #[error("Duplicate rule id: {0}")]
    DuplicateRule(String),

    #[error("Rule '{rule}' references unknown field path '{path}'")]
    InvalidTemplatePath { rule: String, path: String },

    #[error("Unknown workflow type: {0}")]
    UnknownWorkflowType(String),

    #[error("Unknown phase: {0}")]
    UnknownPhase(String),

    #[error("Unknown step: {0}")]
    UnknownStep(String),

    #[error("Invalid step transition for '{step}' from {from} to {to}")]
    InvalidStepTransition {
        step: String,
        from: String,
        to: String,
    },

    #[error("Invalid phase transition for '{phase}' from {from} to {to}")]
    InvalidPhaseTransition {
        phase: String,
        from: String,
        to: String,
    },

    #[error("Phase '{phase}' still has open steps: {}", open.join(", "))]
    PhaseIncomplete { phase: String, open: Vec<String> },

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    /// True when the snapshot file simply does not exist yet.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
