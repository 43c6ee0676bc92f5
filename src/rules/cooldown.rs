//! Per-rule cooldowns.
//!
//! A rule that produced a suggestion is suppressed until its cooldown
//! expires. The store is injected into the engine so callers pick between
//! process-local and on-disk persistence.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::store::{write_atomic, StateLock};
use crate::{klog_warn, Result};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

pub trait CooldownStore: Send + Sync {
    /// Whether `rule_id` is suppressed at `now`.
    fn is_cooling(&self, rule_id: &str, now: DateTime<Utc>) -> bool;

    /// Suppress `rule_id` until `until`.
    fn start(&self, rule_id: &str, until: DateTime<Utc>) -> Result<()>;

    /// Forget every cooldown.
    fn clear(&self) -> Result<()>;
}

/// Cooldowns that live as long as the engine.
#[derive(Debug, Default)]
pub struct MemoryCooldowns {
    until: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl MemoryCooldowns {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CooldownStore for MemoryCooldowns {
    fn is_cooling(&self, rule_id: &str, now: DateTime<Utc>) -> bool {
        let until = self.until.lock().unwrap_or_else(|e| e.into_inner());
        until.get(rule_id).is_some_and(|t| *t > now)
    }

    fn start(&self, rule_id: &str, until: DateTime<Utc>) -> Result<()> {
        let mut map = self.until.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(rule_id.to_string(), until);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.until.lock().unwrap_or_else(|e| e.into_inner()).clear();
        Ok(())
    }
}

/// Cooldowns persisted as a JSON map of rule id to expiry, so they survive
/// across CLI invocations on the same instance.
///
/// Updates take the same lock file as snapshot writes, so several processes
/// can share one cooldown file. Reads are lock-free: the file is only ever
/// replaced by rename.
#[derive(Debug)]
pub struct FileCooldowns {
    path: PathBuf,
    lock_timeout: Duration,
}

impl FileCooldowns {
    pub const FILE_NAME: &'static str = "cooldowns.json";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Cooldown file inside an instance's state directory.
    pub fn in_state_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join(Self::FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> BTreeMap<String, DateTime<Utc>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return BTreeMap::new(),
        };
        match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(e) => {
                klog_warn!("Ignoring unreadable cooldown file {}: {}", self.path.display(), e);
                BTreeMap::new()
            }
        }
    }

    /// Run a load-modify-store cycle under the cooldown file's lock.
    fn locked<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, DateTime<Utc>>),
    {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let _lock = StateLock::acquire(&self.path, self.lock_timeout)?;
        let mut map = self.load();
        f(&mut map);
        write_atomic(&self.path, &serde_json::to_string_pretty(&map)?)
    }
}

impl CooldownStore for FileCooldowns {
    fn is_cooling(&self, rule_id: &str, now: DateTime<Utc>) -> bool {
        self.load().get(rule_id).is_some_and(|t| *t > now)
    }

    fn start(&self, rule_id: &str, until: DateTime<Utc>) -> Result<()> {
        let now = Utc::now();
        self.locked(|map| {
            map.retain(|_, t| *t > now);
            map.insert(rule_id.to_string(), until);
        })
    }

    fn clear(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let _lock = StateLock::acquire(&self.path, self.lock_timeout)?;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_memory_cooldown_expires() {
        let store = MemoryCooldowns::new();
        let now = Utc::now();
        store.start("r1", now + Duration::seconds(60)).unwrap();
        assert!(store.is_cooling("r1", now));
        assert!(!store.is_cooling("r2", now));
        assert!(!store.is_cooling("r1", now + Duration::seconds(61)));
    }

    #[test]
    fn test_memory_cooldown_clear() {
        let store = MemoryCooldowns::new();
        let now = Utc::now();
        store.start("r1", now + Duration::seconds(60)).unwrap();
        store.clear().unwrap();
        assert!(!store.is_cooling("r1", now));
    }

    #[test]
    fn test_file_cooldowns_persist() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        {
            let store = FileCooldowns::in_state_dir(&dir.path().join(".workflow"));
            store.start("r1", now + Duration::seconds(60)).unwrap();
        }
        let store = FileCooldowns::in_state_dir(&dir.path().join(".workflow"));
        assert!(store.path().exists());
        assert!(store.is_cooling("r1", now));
        store.clear().unwrap();
        assert!(!store.is_cooling("r1", now));
        assert!(!store.path().exists());
    }

    #[test]
    fn test_file_cooldowns_shared_between_writers() {
        let dir = TempDir::new().unwrap();
        let state_dir = dir.path().join(".workflow");
        let until = Utc::now() + Duration::seconds(600);

        std::thread::scope(|scope| {
            for writer in 0..8 {
                let state_dir = &state_dir;
                scope.spawn(move || {
                    let store =
                        FileCooldowns::in_state_dir(state_dir).with_lock_timeout(std::time::Duration::from_secs(30));
                    for n in 0..25 {
                        store.start(&format!("w{}-r{}", writer, n), until).unwrap();
                    }
                });
            }
        });

        let store = FileCooldowns::in_state_dir(&state_dir);
        let now = Utc::now();
        for writer in 0..8 {
            for n in 0..25 {
                assert!(store.is_cooling(&format!("w{}-r{}", writer, n), now));
            }
        }
        let leftovers: Vec<_> = fs::read_dir(&state_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n != FileCooldowns::FILE_NAME)
            .collect();
        assert!(leftovers.is_empty(), "unexpected files: {:?}", leftovers);
    }

    #[test]
    fn test_file_cooldowns_wait_for_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(FileCooldowns::FILE_NAME);
        let _held = StateLock::acquire(&path, std::time::Duration::from_millis(50)).unwrap();

        let store = FileCooldowns::new(&path).with_lock_timeout(std::time::Duration::from_millis(30));
        let err = store.start("r1", Utc::now() + Duration::seconds(5)).unwrap_err();
        assert!(matches!(err, crate::Error::Locked(_)));
    }

    #[test]
    fn test_file_cooldowns_corrupt_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cooldowns.json");
        fs::write(&path, "not json").unwrap();
        let store = FileCooldowns::new(&path);
        assert!(!store.is_cooling("r1", Utc::now()));
        store.start("r1", Utc::now() + Duration::seconds(5)).unwrap();
        assert!(store.is_cooling("r1", Utc::now()));
    }
}
