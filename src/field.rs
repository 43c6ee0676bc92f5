//! Dotted-path access into nested JSON values.
//!
//! Paths are `.`-separated segments. A segment addresses an object key, or an
//! array index when the current value is an array and the segment parses as
//! an integer. The pseudo-segment `length` yields the element count of an
//! array, the character count of a string, or the key count of an object,
//! unless the object has a real `length` key.

use serde_json::{Map, Value};

use crate::{Error, Result};

/// Resolve `path` inside `root`.
///
/// Returns an owned value because `length` is synthesised. An empty path
/// resolves to `root` itself.
pub fn resolve(root: &Value, path: &str) -> Option<Value> {
    let mut current = root;
    let segments: Vec<&str> = split(path);

    for (i, segment) in segments.iter().enumerate() {
        match current {
            Value::Object(map) => {
                if let Some(next) = map.get(*segment) {
                    current = next;
                    continue;
                }
                if *segment == "length" && i == segments.len() - 1 {
                    return Some(Value::from(map.len()));
                }
                return None;
            }
            Value::Array(items) => {
                if *segment == "length" {
                    return (i == segments.len() - 1).then(|| Value::from(items.len()));
                }
                let idx: usize = segment.parse().ok()?;
                current = items.get(idx)?;
            }
            Value::String(s) if *segment == "length" && i == segments.len() - 1 => {
                return Some(Value::from(s.chars().count()));
            }
            _ => return None,
        }
    }

    Some(current.clone())
}

/// Resolve a path against a serialised workflow snapshot.
///
/// The full snapshot is searched first (`currentPhase`, `phases.x.status`);
/// if the path does not resolve there it is retried under `customData`, so
/// rules can say `goals.selected` instead of `customData.goals.selected`.
pub fn resolve_in_state(state: &Value, path: &str) -> Option<Value> {
    resolve(state, path).or_else(|| state.get("customData").and_then(|data| resolve(data, path)))
}

/// Write `value` at `path`, creating intermediate objects as needed.
///
/// Existing array elements can be replaced by index; arrays are never
/// extended implicitly.
pub fn set(root: &mut Value, path: &str, value: Value) -> Result<()> {
    let segments = split(path);
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return Ok(());
    };

    let mut current = root;
    for segment in parents {
        current = child_mut(current, segment, path)?;
    }

    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => {
            map.insert((*last).to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let slot = last
                .parse::<usize>()
                .ok()
                .and_then(|idx| items.get_mut(idx))
                .ok_or_else(|| Error::Validation(format!("index '{}' out of range in '{}'", last, path)))?;
            *slot = value;
            Ok(())
        }
        _ => Err(Error::Validation(format!(
            "cannot set '{}': parent is not an object",
            path
        ))),
    }
}

fn child_mut<'a>(current: &'a mut Value, segment: &str, path: &str) -> Result<&'a mut Value> {
    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => Ok(map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()))),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(move |idx| items.get_mut(idx))
            .ok_or_else(|| Error::Validation(format!("index '{}' out of range in '{}'", segment, path))),
        _ => Err(Error::Validation(format!(
            "cannot descend into '{}' while setting '{}'",
            segment, path
        ))),
    }
}

fn split(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

/// Whether a path could resolve in some later snapshot.
///
/// Used at rule-load time to check template references against a probe
/// snapshot: a path is acceptable when it resolves, or when the deepest
/// resolvable prefix is an empty container or null (content that only
/// exists at runtime).
pub fn is_plausible(root: &Value, path: &str) -> bool {
    if resolve(root, path).is_some() {
        return true;
    }
    let segments = split(path);
    let mut current = root;
    for segment in &segments {
        let next = match current {
            Value::Object(map) => map.get(*segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => break,
        }
    }
    match current {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Same as [`is_plausible`] with the `customData` fallback of [`resolve_in_state`].
pub fn is_plausible_in_state(state: &Value, path: &str) -> bool {
    if resolve_in_state(state, path).is_some() {
        return true;
    }
    // Dynamic content under customData only counts when the first segment is
    // a known customData key; an unknown root key is a typo.
    let first = split(path).first().copied().unwrap_or_default();
    match state.get("customData") {
        Some(data) if data.get(first).is_some() => is_plausible(data, path),
        _ => state.get(first).is_some() && is_plausible(state, path),
    }
}
