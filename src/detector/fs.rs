//! Filesystem access for the detector.
//!
//! The detector only ever asks one question of the filesystem: which paths
//! match this glob. `DiskFs` answers it against a real directory, `MemoryFs`
//! against an in-memory tree so reconciliation can be tested without I/O.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};

use crate::{klog_trace, Error, Result};

/// A path matched by a glob, relative to the filesystem root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FsEntry {
    pub path: PathBuf,
    pub is_dir: bool,
}

pub trait FileSystem {
    /// Entries matching `pattern`, a glob relative to the root.
    fn glob(&self, pattern: &str) -> Result<Vec<FsEntry>>;
}

fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    }
}

/// Globs against a directory on disk.
#[derive(Debug, Clone)]
pub struct DiskFs {
    root: PathBuf,
}

impl DiskFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FileSystem for DiskFs {
    fn glob(&self, pattern: &str) -> Result<Vec<FsEntry>> {
        let full = self.root.join(pattern);
        let full = full.to_string_lossy();
        klog_trace!("DiskFs::glob pattern={}", full);

        let mut entries = Vec::new();
        for matched in glob::glob_with(&full, match_options())? {
            let path = matched.map_err(|e| Error::Io(e.into_error()))?;
            let is_dir = path.is_dir();
            let relative = path
                .strip_prefix(&self.root)
                .map(Path::to_path_buf)
                .unwrap_or(path);
            entries.push(FsEntry {
                path: relative,
                is_dir,
            });
        }
        entries.sort();
        Ok(entries)
    }
}

/// In-memory tree for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    entries: BTreeMap<PathBuf, bool>,
    failing: BTreeSet<String>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dir(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.insert(path.as_ref(), true);
        self
    }

    pub fn add_file(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.insert(path.as_ref(), false);
        self
    }

    pub fn remove(&mut self, path: impl AsRef<Path>) -> &mut Self {
        let path = path.as_ref();
        self.entries.retain(|p, _| !p.starts_with(path));
        self
    }

    /// Make every glob of `pattern` fail, as an unreadable directory would.
    pub fn fail_pattern(&mut self, pattern: impl Into<String>) -> &mut Self {
        self.failing.insert(pattern.into());
        self
    }

    fn insert(&mut self, path: &Path, is_dir: bool) {
        for ancestor in path.ancestors().skip(1) {
            if !ancestor.as_os_str().is_empty() {
                self.entries.insert(ancestor.to_path_buf(), true);
            }
        }
        self.entries.insert(path.to_path_buf(), is_dir);
    }
}

impl FileSystem for MemoryFs {
    fn glob(&self, pattern: &str) -> Result<Vec<FsEntry>> {
        if self.failing.contains(pattern) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("permission denied: {}", pattern),
            )));
        }
        let compiled = Pattern::new(pattern)?;
        Ok(self
            .entries
            .iter()
            .filter(|(path, _)| compiled.matches_path_with(path, match_options()))
            .map(|(path, is_dir)| FsEntry {
                path: path.clone(),
                is_dir: *is_dir,
            })
            .collect())
    }
}
