//! Snapshot persistence.
//!
//! One JSON file per workflow instance, written through a temp file and a
//! rename, guarded by a lock file and a revision compare-and-swap so two
//! read-modify-write cycles on the same instance cannot silently overwrite
//! each other.

mod lock;
mod manager;

pub use lock::StateLock;
pub use manager::{workflow_type_at, StateStore};
pub(crate) use manager::write_atomic;
