//! Filesystem reconciliation.
//!
//! Certain directories of an instance are authoritative for which entities
//! exist (a directory per selected goal, a file per active task); the
//! snapshot is authoritative for how they are tracked. The detector scans
//! the configured locations and appends newly discovered entities to the
//! snapshot. It never removes anything: a missing file may be a partial or
//! transient view of the disk.

mod fs;
mod reconcile;

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::workflow::WorkflowState;
use crate::{klog, Result};

pub use fs::{DiskFs, FileSystem, FsEntry, MemoryFs};
pub use reconcile::{reconcile, scan, sync, DiskView, EntityMapping, IdSource, SyncOutcome};

/// Scans one instance's filesystem through a fixed set of entity mappings.
pub struct StateDetector {
    fs: Box<dyn FileSystem>,
    mappings: Vec<EntityMapping>,
}

impl StateDetector {
    pub fn new(fs: Box<dyn FileSystem>, mappings: Vec<EntityMapping>) -> Self {
        Self { fs, mappings }
    }

    /// Detector over the real directory `root`.
    pub fn for_instance(root: &Path, mappings: Vec<EntityMapping>) -> Self {
        Self::new(Box::new(DiskFs::new(root)), mappings)
    }

    pub fn mappings(&self) -> &[EntityMapping] {
        &self.mappings
    }

    /// Current filesystem view, without touching any state.
    pub fn scan(&self) -> DiskView {
        scan(self.fs.as_ref(), &self.mappings)
    }

    /// Reconcile `state` against the filesystem.
    pub fn sync<T>(&self, state: WorkflowState<T>) -> Result<SyncOutcome<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        let outcome = sync(self.fs.as_ref(), &self.mappings, state)?;
        if !outcome.changes.is_empty() || !outcome.failures.is_empty() {
            klog!(
                "sync '{}': {} added, {} failed",
                outcome.state.name,
                outcome.changes.len(),
                outcome.failures.len()
            );
        }
        Ok(outcome)
    }
}
