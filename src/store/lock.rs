//! Advisory lock file held around read-compare-write of a snapshot.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use uuid::Uuid;

use crate::{klog_debug, klog_warn, Error, Result};

const RETRY_INTERVAL: Duration = Duration::from_millis(10);
/// A lock older than this is assumed to belong to a crashed writer.
const STALE_AFTER: Duration = Duration::from_secs(30);

/// Exclusive lock on a state file, released on drop.
#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
    token: Uuid,
}

impl StateLock {
    /// Lock path used for `state_path`.
    pub fn lock_path(state_path: &Path) -> PathBuf {
        let mut name = state_path.as_os_str().to_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Acquire the lock for `state_path`, waiting up to `timeout`.
    pub fn acquire(state_path: &Path, timeout: Duration) -> Result<Self> {
        let path = Self::lock_path(state_path);
        let token = Uuid::new_v4();
        let deadline = Instant::now() + timeout;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    writeln!(file, "{} {}", std::process::id(), token)?;
                    klog_debug!("StateLock acquired {}", path.display());
                    return Ok(Self { path, token });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if let Some(seen) = stale_contents(&path) {
                        if remove_stale(&path, &seen) {
                            klog_warn!("Removed stale lock {}", path.display());
                            continue;
                        }
                    }
                    if Instant::now() >= deadline {
                        return Err(Error::Locked(path));
                    }
                    thread::sleep(RETRY_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        // Only remove the file if it is still ours; a stale-lock sweep by
        // another process may have replaced it.
        let ours = fs::read_to_string(&self.path)
            .map(|c| c.contains(&self.token.to_string()))
            .unwrap_or(false);
        if ours {
            let _ = fs::remove_file(&self.path);
            klog_debug!("StateLock released {}", self.path.display());
        }
    }
}

fn is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .map(|age| age > STALE_AFTER)
        .unwrap_or(false)
}

/// Contents of the lock at `path` if it is old enough to be abandoned.
fn stale_contents(path: &Path) -> Option<String> {
    if !is_stale(path) {
        return None;
    }
    fs::read_to_string(path).ok()
}

/// Remove the lock at `path` only if it is still the stale lock whose
/// contents were `seen`.
///
/// The file is first renamed aside, which takes whatever lock is there
/// now in one step. If that turns out to be a fresh lock, created after
/// the staleness check, it is linked back into place untouched.
fn remove_stale(path: &Path, seen: &str) -> bool {
    let mut aside = path.as_os_str().to_os_string();
    aside.push(format!(".stale.{}", Uuid::new_v4().simple()));
    let aside = PathBuf::from(aside);

    if fs::rename(path, &aside).is_err() {
        return false;
    }
    let same = is_stale(&aside) && fs::read_to_string(&aside).is_ok_and(|c| c == seen);
    if !same {
        klog_debug!("Lock {} was re-created, restoring it", path.display());
        let _ = fs::hard_link(&aside, path);
    }
    let _ = fs::remove_file(&aside);
    same
}
