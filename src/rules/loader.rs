//! Rule files.
//!
//! A rule file is either a bare JSON array of rules, applied to every
//! workflow type, or an object scoping its rules to one type:
//!
//! ```json
//! { "workflowType": "project", "rules": [ ... ] }
//! ```
//!
//! A directory source loads every `*.json` file inside it in name order.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::{klog_debug, Error, Result};

use super::engine::Rule;

/// Rule files compiled into the binary, keyed by name.
const BUILTIN: &[(&str, &str)] = &[
    ("builtin:project", include_str!("../../rules/project.json")),
    ("builtin:goal", include_str!("../../rules/goal.json")),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    File(PathBuf),
    Dir(PathBuf),
    Inline { name: String, json: String },
}

impl RuleSource {
    /// A file or directory, whichever `path` is.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_dir() {
            RuleSource::Dir(path)
        } else {
            RuleSource::File(path)
        }
    }

    pub fn inline(name: &str, json: &str) -> Self {
        RuleSource::Inline {
            name: name.to_string(),
            json: json.to_string(),
        }
    }
}

/// Parse one rule document, keeping the rules that apply to `workflow_type`.
pub fn parse(source_name: &str, json: &str, workflow_type: &str) -> Result<Vec<Rule>> {
    let load_err = |reason: String| Error::RuleLoad {
        source_name: source_name.to_string(),
        reason,
    };

    let doc: Value = serde_json::from_str(json).map_err(|e| load_err(e.to_string()))?;
    let entries = match doc {
        Value::Array(entries) => entries,
        Value::Object(mut map) => {
            let scope = match map.get("workflowType") {
                Some(Value::String(s)) => s.clone(),
                Some(_) => return Err(load_err("workflowType must be a string".to_string())),
                None => return Err(load_err("missing workflowType".to_string())),
            };
            if scope != workflow_type {
                klog_debug!("Skipping {} rules from {}", scope, source_name);
                return Ok(Vec::new());
            }
            match map.remove("rules") {
                Some(Value::Array(entries)) => entries,
                Some(_) => return Err(load_err("rules must be an array".to_string())),
                None => return Err(load_err("missing rules".to_string())),
            }
        }
        _ => return Err(load_err("expected an array of rules or an object with rules".to_string())),
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let rule = serde_json::from_value::<Rule>(entry).map_err(|e| load_err(format!("rule {}: {}", i, e)))?;
            rule.check_cooldown().map_err(|reason| load_err(format!("rule {}: {}", i, reason)))?;
            Ok(rule)
        })
        .collect()
}

fn load_file(path: &Path, workflow_type: &str) -> Result<Vec<Rule>> {
    let json = fs::read_to_string(path).map_err(|e| Error::RuleLoad {
        source_name: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse(&path.display().to_string(), &json, workflow_type)
}

fn load_dir(dir: &Path, workflow_type: &str) -> Result<Vec<Rule>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    let mut rules = Vec::new();
    for file in files {
        rules.extend(load_file(&file, workflow_type)?);
    }
    Ok(rules)
}

/// Load every source in order. Rule ids must be unique across all sources.
pub fn load(sources: &[RuleSource], workflow_type: &str) -> Result<Vec<Rule>> {
    let mut rules = Vec::new();
    for source in sources {
        let loaded = match source {
            RuleSource::File(path) => load_file(path, workflow_type)?,
            RuleSource::Dir(dir) => load_dir(dir, workflow_type)?,
            RuleSource::Inline { name, json } => parse(name, json, workflow_type)?,
        };
        klog_debug!("Loaded {} rule(s) from {:?}", loaded.len(), source);
        rules.extend(loaded);
    }

    let mut seen = HashSet::new();
    for rule in &rules {
        if !seen.insert(rule.id.as_str()) {
            return Err(Error::DuplicateRule(rule.id.clone()));
        }
    }
    Ok(rules)
}

/// The rule sources shipped with the crate.
pub fn builtin_sources() -> Vec<RuleSource> {
    BUILTIN
        .iter()
        .map(|(name, json)| RuleSource::inline(name, json))
        .collect()
}
