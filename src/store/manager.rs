//! StateStore - JSON snapshot persistence for one workflow type.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::config::Config;
use crate::workflow::{PhaseInfo, WorkflowSchema, WorkflowState};
use crate::{klog, klog_debug, klog_error, klog_warn, Error, Result};

use super::lock::StateLock;

const REQUIRED_FIELDS: &[&str] = &[
    "version",
    "workflowType",
    "name",
    "created",
    "lastUpdated",
    "currentPhase",
    "phases",
    "customData",
];

/// Conflicts retried by [`StateStore::update`] before giving up.
const UPDATE_ATTEMPTS: usize = 3;

/// Reads and writes `WorkflowState<T>` snapshots under a root directory.
///
/// Instances are addressed by id, a path relative to the root (absolute
/// paths are used as-is). The snapshot of instance `id` lives at
/// `<root>/<id>/<state_dir>/<state_file>`.
#[derive(Debug, Clone)]
pub struct StateStore<T> {
    root: PathBuf,
    schema: WorkflowSchema,
    state_dir: String,
    state_file: String,
    lock_timeout: Duration,
    _payload: PhantomData<fn() -> T>,
}

impl<T> StateStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(root: impl Into<PathBuf>, schema: WorkflowSchema) -> Self {
        Self::with_config(root, schema, &Config::default())
    }

    pub fn with_config(root: impl Into<PathBuf>, schema: WorkflowSchema, config: &Config) -> Self {
        Self {
            root: root.into(),
            schema,
            state_dir: config.state_dir.clone(),
            state_file: config.state_file.clone(),
            lock_timeout: config.lock_timeout(),
            _payload: PhantomData,
        }
    }

    pub fn schema(&self) -> &WorkflowSchema {
        &self.schema
    }

    /// Directory of instance `id`.
    pub fn instance_dir(&self, id: impl AsRef<Path>) -> PathBuf {
        self.root.join(id)
    }

    pub fn state_path(&self, id: impl AsRef<Path>) -> PathBuf {
        self.instance_dir(id).join(&self.state_dir).join(&self.state_file)
    }

    pub fn exists(&self, id: impl AsRef<Path>) -> bool {
        self.state_path(id).exists()
    }

    /// Load and validate the snapshot of `id`.
    ///
    /// Returns `NotFound` when there is no file and `Invalid` when the file
    /// exists but is not a valid snapshot for this workflow type.
    pub fn read(&self, id: impl AsRef<Path>) -> Result<WorkflowState<T>> {
        let path = self.state_path(id);
        klog_debug!("StateStore::read path={}", path.display());

        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::NotFound { path });
            }
            Err(e) => {
                klog_error!("Failed to read {}: {}", path.display(), e);
                return Err(e.into());
            }
        };
        self.parse(&path, &contents)
    }

    /// Write `state` to `id`, atomically.
    ///
    /// The write is a compare-and-swap on `revision`: if the file on disk
    /// carries a different revision than `state`, someone else wrote in
    /// between and `RevisionConflict` is returned. On success `state` has its
    /// revision bumped and `lastUpdated` stamped; on failure it is unchanged.
    pub fn write(&self, id: impl AsRef<Path>, state: &mut WorkflowState<T>) -> Result<()> {
        let path = self.state_path(id);
        if let Err(reason) = state.check_invariants(&self.schema) {
            return Err(Error::Invalid { path, reason });
        }
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                klog_debug!("Creating state directory: {}", dir.display());
                fs::create_dir_all(dir)?;
            }
        }

        let _lock = StateLock::acquire(&path, self.lock_timeout)?;

        if let Some(disk) = on_disk(&path)? {
            if disk.revision != state.revision {
                klog_warn!(
                    "Revision conflict on {}: expected {}, found {}",
                    path.display(),
                    state.revision,
                    disk.revision
                );
                return Err(Error::RevisionConflict {
                    expected: state.revision,
                    found: disk.revision,
                });
            }
            if let Err(e) = state.check_progress_from(&disk.phases) {
                klog_warn!("Refusing to write {}: {}", path.display(), e);
                return Err(e);
            }
        }

        let previous = (state.revision, state.last_updated);
        state.revision += 1;
        state.last_updated = Utc::now();

        let result = serde_json::to_string_pretty(state)
            .map_err(Error::from)
            .and_then(|contents| write_atomic(&path, &contents));
        if let Err(e) = result {
            klog_error!("Failed to write {}: {}", path.display(), e);
            (state.revision, state.last_updated) = previous;
            return Err(e);
        }

        klog_debug!("State saved: {} (revision {})", path.display(), state.revision);
        Ok(())
    }

    /// Create and persist the default snapshot for this workflow type.
    pub fn initialize(&self, id: impl AsRef<Path>, name: &str) -> Result<WorkflowState<T>> {
        let id = id.as_ref();
        let path = self.state_path(id);
        if path.exists() {
            return Err(Error::StateExists(path));
        }
        let mut state = WorkflowState::new(&self.schema, name, T::default())?;
        self.write(id, &mut state)?;
        klog!(
            "Initialized {} workflow '{}' at {}",
            self.schema.workflow_type,
            name,
            path.display()
        );
        Ok(state)
    }

    /// Read `id`, initializing it if no snapshot exists.
    ///
    /// An invalid snapshot is reported, never silently replaced.
    pub fn get_or_initialize(&self, id: impl AsRef<Path>, name: &str) -> Result<WorkflowState<T>> {
        let id = id.as_ref();
        match self.read(id) {
            Err(Error::NotFound { .. }) => self.initialize(id, name),
            other => other,
        }
    }

    /// Read-modify-write `id` with `f`.
    ///
    /// If another writer gets in between the read and the write, the update
    /// is re-run against the fresh snapshot, a bounded number of times.
    pub fn update<F>(&self, id: impl AsRef<Path>, mut f: F) -> Result<WorkflowState<T>>
    where
        F: FnMut(WorkflowState<T>) -> Result<WorkflowState<T>>,
    {
        let id = id.as_ref();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut state = f(self.read(id)?)?;
            match self.write(id, &mut state) {
                Err(Error::RevisionConflict { .. }) if attempt < UPDATE_ATTEMPTS => {
                    klog_debug!("StateStore::update retrying after conflict (attempt {})", attempt);
                }
                Err(e) => return Err(e),
                Ok(()) => return Ok(state),
            }
        }
    }

    /// Check required top-level fields and the phase set of a raw snapshot.
    pub fn validate(&self, raw: &Value) -> bool {
        self.check(raw).is_ok()
    }

    /// Copy the current snapshot to `<state-file>.backup.<timestamp>`.
    ///
    /// Timestamps carry microseconds; if a backup with the same name still
    /// exists a counter suffix is added. Existing backups are never replaced.
    pub fn backup(&self, id: impl AsRef<Path>) -> Result<PathBuf> {
        let path = self.state_path(id);
        if !path.exists() {
            return Err(Error::NotFound { path });
        }

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ").to_string();
        let base = format!("{}.backup.{}", self.state_file, stamp);
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut counter = 0;
        loop {
            let name = if counter == 0 {
                base.clone()
            } else {
                format!("{}-{}", base, counter)
            };
            let candidate = dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(mut out) => {
                    let mut src = fs::File::open(&path)?;
                    io::copy(&mut src, &mut out)?;
                    klog_debug!("Created state backup: {}", candidate.display());
                    return Ok(candidate);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => counter += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Existing backups of `id`, newest first.
    pub fn backups(&self, id: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let path = self.state_path(id);
        let Some(dir) = path.parent() else {
            return Ok(Vec::new());
        };
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let prefix = format!("{}.backup.", self.state_file);
        let mut found: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix))
            })
            .collect();
        found.sort();
        found.reverse();
        Ok(found)
    }

    /// Remove the snapshot of `id`. Backups and reconciled source files stay.
    pub fn delete(&self, id: impl AsRef<Path>) -> Result<()> {
        let path = self.state_path(id);
        if !path.exists() {
            return Err(Error::NotFound { path });
        }
        let _lock = StateLock::acquire(&path, self.lock_timeout)?;
        fs::remove_file(&path)?;
        klog!("Deleted state {}", path.display());
        Ok(())
    }

    fn parse(&self, path: &Path, contents: &str) -> Result<WorkflowState<T>> {
        let invalid = |reason: String| Error::Invalid {
            path: path.to_path_buf(),
            reason,
        };

        let raw: Value = serde_json::from_str(contents).map_err(|e| invalid(format!("not JSON: {}", e)))?;
        self.check(&raw).map_err(invalid)?;
        let state: WorkflowState<T> = serde_json::from_value(raw).map_err(|e| invalid(e.to_string()))?;
        state.check_invariants(&self.schema).map_err(invalid)?;

        klog_debug!(
            "State loaded: {} phase={} step={} revision={}",
            state.name,
            state.current_phase,
            state.current_step,
            state.revision
        );
        Ok(state)
    }

    fn check(&self, raw: &Value) -> std::result::Result<(), String> {
        let obj = raw.as_object().ok_or("snapshot is not a JSON object")?;
        if let Some(missing) = REQUIRED_FIELDS.iter().find(|f| !obj.contains_key(**f)) {
            return Err(format!("missing field '{}'", missing));
        }
        match obj.get("workflowType").and_then(Value::as_str) {
            Some(t) if t == self.schema.workflow_type => {}
            Some(t) => {
                return Err(format!(
                    "workflowType '{}' does not match '{}'",
                    t, self.schema.workflow_type
                ))
            }
            None => return Err("workflowType is not a string".to_string()),
        }
        let phases = obj
            .get("phases")
            .and_then(Value::as_object)
            .ok_or("phases is not an object")?;
        if let Some(missing) = self.schema.phase_ids().find(|id| !phases.contains_key(*id)) {
            return Err(format!("missing phase '{}'", missing));
        }
        Ok(())
    }
}

/// `workflowType` recorded in the snapshot at `path`, without validating
/// the rest of it. Used to pick the payload type before a typed read.
pub fn workflow_type_at(path: &Path) -> Result<String> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::NotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(e.into()),
    };
    let invalid = |reason: &str| Error::Invalid {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    let raw: Value = serde_json::from_str(&contents).map_err(|e| invalid(&format!("not JSON: {}", e)))?;
    raw.get("workflowType")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| invalid("missing field 'workflowType'"))
}

/// What a write is checked against: the snapshot currently on disk.
struct OnDisk {
    revision: u64,
    phases: BTreeMap<String, PhaseInfo>,
}

/// Revision and phase progress of the snapshot on disk, if there is a
/// readable one.
///
/// A corrupt file reports `None` so a fresh write can replace it. A file
/// whose phases do not parse is compared as if it had no progress.
fn on_disk(path: &Path) -> Result<Option<OnDisk>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let Ok(raw) = serde_json::from_str::<Value>(&contents) else {
        return Ok(None);
    };
    let revision = raw.get("revision").and_then(Value::as_u64).unwrap_or(0);
    let phases = raw
        .get("phases")
        .cloned()
        .and_then(|p| serde_json::from_value(p).ok())
        .unwrap_or_default();
    Ok(Some(OnDisk { revision, phases }))
}

/// Write `contents` to a uniquely named sibling, then rename it over `path`.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(format!(".{}.tmp", &Uuid::new_v4().simple().to_string()[..8]));
    let temp_path = PathBuf::from(temp_name);

    fs::write(&temp_path, contents)?;
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}
