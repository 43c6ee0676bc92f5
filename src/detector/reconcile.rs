//! Additive reconciliation of a snapshot against a filesystem view.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::field;
use crate::workflow::WorkflowState;
use crate::{klog_debug, klog_warn, Result};

use super::fs::{FileSystem, FsEntry};

/// How an entity id is derived from a matched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum IdSource {
    /// Final path component of a matched directory. Files are ignored.
    #[default]
    DirName,
    /// File name without extension. Directories are ignored.
    FileStem,
    /// Full file name. Directories are ignored.
    FileName,
}

impl IdSource {
    fn id_for(&self, entry: &FsEntry) -> Option<String> {
        let component = match self {
            IdSource::DirName if entry.is_dir => entry.path.file_name(),
            IdSource::FileName if !entry.is_dir => entry.path.file_name(),
            IdSource::FileStem if !entry.is_dir => entry.path.file_stem(),
            _ => None,
        };
        component.map(|c| c.to_string_lossy().into_owned())
    }
}

/// Maps one entity type to the files that prove its existence and the
/// `customData` list that tracks it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMapping {
    pub entity_type: String,
    /// Glob relative to the instance root.
    pub pattern: String,
    /// Dotted path inside `customData` holding the id list.
    pub target: String,
    #[serde(default)]
    pub id_from: IdSource,
    /// Other `customData` lists whose ids count as already tracked, such as
    /// an archive list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl EntityMapping {
    pub fn new(entity_type: &str, pattern: &str, target: &str, id_from: IdSource) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            pattern: pattern.to_string(),
            target: target.to_string(),
            id_from,
            exclude: Vec::new(),
        }
    }

    pub fn excluding(mut self, paths: &[&str]) -> Self {
        self.exclude = paths.iter().map(|p| p.to_string()).collect();
        self
    }
}

/// Entity ids observed on disk, per entity type. A failed scan is kept as
/// an error string so the other entity types still reconcile.
pub type DiskView = BTreeMap<String, std::result::Result<Vec<String>, String>>;

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome<T> {
    pub state: WorkflowState<T>,
    /// One human-readable line per added entity.
    pub changes: Vec<String>,
    /// Entity types that could not be scanned or merged.
    pub failures: Vec<String>,
}

impl<T> SyncOutcome<T> {
    pub fn is_unchanged(&self) -> bool {
        self.changes.is_empty()
    }
}

/// List entity ids on disk for every mapping. Ids are sorted and unique.
pub fn scan(fs: &dyn FileSystem, mappings: &[EntityMapping]) -> DiskView {
    let mut view = DiskView::new();
    for mapping in mappings {
        let result = fs.glob(&mapping.pattern).map(|entries| {
            entries
                .iter()
                .filter_map(|e| mapping.id_from.id_for(e))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect::<Vec<_>>()
        });
        let entry = match result {
            Ok(ids) => {
                klog_debug!("scan {}: {} on disk", mapping.entity_type, ids.len());
                Ok(ids)
            }
            Err(e) => {
                klog_warn!("scan {} failed for '{}': {}", mapping.entity_type, mapping.pattern, e);
                Err(e.to_string())
            }
        };
        // Two mappings of the same entity type merge their ids.
        match entry {
            Ok(ids) => {
                let slot = view
                    .entry(mapping.entity_type.clone())
                    .or_insert_with(|| Ok(Vec::new()));
                if let Ok(existing) = slot {
                    existing.extend(ids);
                    existing.sort();
                    existing.dedup();
                }
            }
            Err(e) => {
                view.insert(mapping.entity_type.clone(), Err(e));
            }
        }
    }
    view
}

/// Merge entities from `view` into `state`.
///
/// Pure over its inputs: entities present on disk but untracked are
/// appended to their target list; entities tracked but missing on disk are
/// left alone. Running it again over the same view yields no changes.
///
/// A mapping is merged after every mapping that fills one of its exclusion
/// lists, so the result does not depend on the order mappings are declared
/// in.
pub fn reconcile<T>(view: &DiskView, mappings: &[EntityMapping], state: WorkflowState<T>) -> Result<SyncOutcome<T>>
where
    T: Serialize + DeserializeOwned,
{
    let mut data = serde_json::to_value(&state.custom_data)?;
    let mut changes = Vec::new();
    let mut failures = Vec::new();

    for mapping in merge_order(mappings) {
        let ids = match view.get(&mapping.entity_type) {
            Some(Ok(ids)) => ids,
            Some(Err(e)) => {
                let line = format!("{}: {}", mapping.entity_type, e);
                if !failures.contains(&line) {
                    failures.push(line);
                }
                continue;
            }
            None => continue,
        };

        match merge_ids(&mut data, mapping, ids) {
            Ok(added) => {
                for id in added {
                    changes.push(format!(
                        "Added {} '{}' to {}",
                        mapping.entity_type, id, mapping.target
                    ));
                }
            }
            Err(reason) => {
                klog_warn!("reconcile {} skipped: {}", mapping.entity_type, reason);
                failures.push(format!("{}: {}", mapping.entity_type, reason));
            }
        }
    }

    let custom_data: T = serde_json::from_value(data)?;
    Ok(SyncOutcome {
        state: WorkflowState {
            custom_data,
            ..state
        },
        changes,
        failures,
    })
}

/// Scan `fs` and reconcile `state` in one step.
pub fn sync<T>(fs: &dyn FileSystem, mappings: &[EntityMapping], state: WorkflowState<T>) -> Result<SyncOutcome<T>>
where
    T: Serialize + DeserializeOwned,
{
    reconcile(&scan(fs, mappings), mappings, state)
}

/// Declared order, except that a mapping waits for every mapping whose
/// target it excludes. Mappings caught in an exclusion cycle keep their
/// declared order.
fn merge_order(mappings: &[EntityMapping]) -> Vec<&EntityMapping> {
    let mut placed = vec![false; mappings.len()];
    let mut order = Vec::with_capacity(mappings.len());

    while order.len() < mappings.len() {
        let waiting = |i: usize| {
            mappings.iter().enumerate().any(|(j, other)| {
                j != i && !placed[j] && mappings[i].exclude.contains(&other.target)
            })
        };
        let remaining = (0..mappings.len()).filter(|&i| !placed[i]);
        let next = remaining.clone().find(|&i| !waiting(i)).or_else(|| remaining.min());
        let Some(i) = next else {
            break;
        };
        placed[i] = true;
        order.push(&mappings[i]);
    }
    order
}

fn merge_ids(data: &mut Value, mapping: &EntityMapping, ids: &[String]) -> std::result::Result<Vec<String>, String> {
    let mut list = match field::resolve(data, &mapping.target) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(format!(
                "target '{}' is not a list (found {})",
                mapping.target,
                type_name(&other)
            ))
        }
    };

    let mut tracked: BTreeSet<String> = list.iter().filter_map(id_of).collect();
    for path in &mapping.exclude {
        if let Some(Value::Array(items)) = field::resolve(data, path) {
            tracked.extend(items.iter().filter_map(id_of));
        }
    }

    let mut added = Vec::new();
    for id in ids {
        if tracked.insert(id.clone()) {
            list.push(Value::String(id.clone()));
            added.push(id.clone());
        }
    }

    if !added.is_empty() {
        field::set(data, &mapping.target, Value::Array(list)).map_err(|e| e.to_string())?;
    }
    Ok(added)
}

/// Tracked entries are plain id strings or objects with an `id` field.
fn id_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
