//! Rule actions and `{{field.path}}` template rendering.
//!
//! A placeholder whose path does not resolve is left in the output verbatim
//! and reported in the suggestion's `unresolved` list; the suggestion itself
//! is still returned. A path ending in `?` marks a field that may legitimately
//! be absent at runtime and is exempt from load-time path checks.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::field;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)(\?)?\s*\}\}").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    Message {
        text: String,
    },
    ToolCall {
        #[serde(alias = "toolName")]
        tool: String,
        #[serde(default)]
        params: Value,
    },
}

/// A placeholder found in an action template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    pub path: String,
    pub optional: bool,
}

impl Action {
    pub fn message(text: &str) -> Self {
        Action::Message {
            text: text.to_string(),
        }
    }

    /// All placeholders in the action, in order of appearance.
    pub fn template_refs(&self) -> Vec<TemplateRef> {
        let mut refs = Vec::new();
        match self {
            Action::Message { text } => collect_refs(text, &mut refs),
            Action::ToolCall { tool, params } => {
                collect_refs(tool, &mut refs);
                visit_strings(params, &mut |s| collect_refs(s, &mut refs));
            }
        }
        refs
    }

    /// Render every placeholder against `state`.
    ///
    /// Returns the rendered action and the paths that could not be resolved.
    pub fn render(&self, state: &Value) -> (Action, Vec<String>) {
        let mut unresolved = Vec::new();
        let action = match self {
            Action::Message { text } => Action::Message {
                text: render_str(text, state, &mut unresolved),
            },
            Action::ToolCall { tool, params } => Action::ToolCall {
                tool: render_str(tool, state, &mut unresolved),
                params: render_value(params, state, &mut unresolved),
            },
        };
        (action, unresolved)
    }
}

fn collect_refs(text: &str, out: &mut Vec<TemplateRef>) {
    for caps in PLACEHOLDER_RE.captures_iter(text) {
        out.push(TemplateRef {
            path: caps[1].to_string(),
            optional: caps.get(2).is_some(),
        });
    }
}

fn visit_strings(value: &Value, f: &mut dyn FnMut(&str)) {
    match value {
        Value::String(s) => f(s),
        Value::Array(items) => items.iter().for_each(|v| visit_strings(v, f)),
        Value::Object(map) => map.values().for_each(|v| visit_strings(v, f)),
        _ => {}
    }
}

fn render_str(text: &str, state: &Value, unresolved: &mut Vec<String>) -> String {
    PLACEHOLDER_RE
        .replace_all(text, |caps: &Captures| {
            let path = &caps[1];
            match field::resolve_in_state(state, path) {
                Some(value) if !value.is_null() => display(&value),
                _ => {
                    if !unresolved.iter().any(|u| u == path) {
                        unresolved.push(path.to_string());
                    }
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

/// Render params. A string that is exactly one placeholder takes the typed
/// value it resolves to, so `"ids": "{{goals.selected}}"` yields an array.
fn render_value(value: &Value, state: &Value, unresolved: &mut Vec<String>) -> Value {
    match value {
        Value::String(s) => {
            if let Some(caps) = PLACEHOLDER_RE.captures(s) {
                if caps[0].len() == s.len() {
                    if let Some(resolved) = field::resolve_in_state(state, &caps[1]).filter(|v| !v.is_null()) {
                        return resolved;
                    }
                }
            }
            Value::String(render_str(s, state, unresolved))
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, state, unresolved)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, state, unresolved)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> Value {
        json!({
            "name": "Acme",
            "currentPhase": "execution",
            "customData": { "goals": { "selected": ["a", "b"] }, "count": 2 }
        })
    }

    #[test]
    fn test_render_message() {
        let action = Action::message("{{name}} is in {{ currentPhase }} with {{goals.selected.length}} goals");
        let (rendered, unresolved) = action.render(&state());
        assert_eq!(rendered, Action::message("Acme is in execution with 2 goals"));
        assert!(unresolved.is_empty());
    }

    #[test]
    fn test_missing_placeholder_left_literal() {
        let action = Action::message("Review {{goals.current.title}} for {{name}}");
        let (rendered, unresolved) = action.render(&state());
        assert_eq!(rendered, Action::message("Review {{goals.current.title}} for Acme"));
        assert_eq!(unresolved, vec!["goals.current.title".to_string()]);
    }

    #[test]
    fn test_optional_marker_renders_like_plain() {
        let (rendered, unresolved) = Action::message("{{name?}} / {{owner?}}").render(&state());
        assert_eq!(rendered, Action::message("Acme / {{owner?}}"));
        assert_eq!(unresolved, vec!["owner".to_string()]);
    }

    #[test]
    fn test_render_tool_params_typed() {
        let action = Action::ToolCall {
            tool: "prepare_handoff".to_string(),
            params: json!({
                "goalIds": "{{goals.selected}}",
                "label": "project {{name}}",
                "count": "{{count}}",
                "fixed": 3
            }),
        };
        let (rendered, unresolved) = action.render(&state());
        assert!(unresolved.is_empty());
        match rendered {
            Action::ToolCall { tool, params } => {
                assert_eq!(tool, "prepare_handoff");
                assert_eq!(params["goalIds"], json!(["a", "b"]));
                assert_eq!(params["label"], json!("project Acme"));
                assert_eq!(params["count"], json!(2));
                assert_eq!(params["fixed"], json!(3));
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_template_refs() {
        let action = Action::ToolCall {
            tool: "t".to_string(),
            params: json!({"a": ["{{x.y}}", {"b": "{{z?}}"}]}),
        };
        assert_eq!(
            action.template_refs(),
            vec![
                TemplateRef { path: "x.y".into(), optional: false },
                TemplateRef { path: "z".into(), optional: true },
            ]
        );
    }

    #[test]
    fn test_action_serde_shape() {
        let action: Action = serde_json::from_value(json!({
            "type": "toolCall",
            "toolName": "sync",
            "params": {}
        }))
        .unwrap();
        assert!(matches!(action, Action::ToolCall { ref tool, .. } if tool == "sync"));
        let msg: Action = serde_json::from_value(json!({"type": "message", "text": "hi"})).unwrap();
        assert_eq!(msg, Action::message("hi"));
    }
}
