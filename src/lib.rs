pub mod config;
pub mod detector;
pub mod error;
pub mod field;
pub mod goal;
pub mod instance;
pub mod log;
pub mod project;
pub mod rules;
pub mod store;
pub mod workflow;

pub use error::{Error, Result};
pub use instance::Instance;
pub use workflow::{SchemaRegistry, WorkflowSchema, WorkflowState};
