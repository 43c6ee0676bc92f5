//! Rule conditions: a closed set of matchers and boolean combinators.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::field;

/// A single id or a list of ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn contains(&self, id: &str) -> bool {
        match self {
            OneOrMany::One(one) => one == id,
            OneOrMany::Many(many) => many.iter().any(|m| m == id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Equals,
    GreaterThan,
    LessThan,
    Contains,
    /// Present and not null. With `value: false`, absent or null.
    Exists,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Condition {
    Phase {
        phase: OneOrMany,
    },
    Step {
        step: String,
    },
    Field {
        path: String,
        #[serde(alias = "op")]
        operator: Operator,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
    And {
        conditions: Vec<Condition>,
    },
    Or {
        conditions: Vec<Condition>,
    },
    Not {
        condition: Box<Condition>,
    },
}

impl Condition {
    pub fn field(path: &str, operator: Operator, value: Value) -> Self {
        Condition::Field {
            path: path.to_string(),
            operator,
            value: Some(value),
        }
    }

    pub fn phase(id: &str) -> Self {
        Condition::Phase {
            phase: OneOrMany::One(id.to_string()),
        }
    }

    pub fn and(conditions: Vec<Condition>) -> Self {
        Condition::And { conditions }
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Condition::Or { conditions }
    }

    pub fn not(condition: Condition) -> Self {
        Condition::Not {
            condition: Box::new(condition),
        }
    }

    /// Evaluate against a serialised snapshot. Pure; `And`/`Or`
    /// short-circuit. An empty `And` is true and an empty `Or` is false.
    pub fn evaluate(&self, state: &Value) -> bool {
        match self {
            Condition::Phase { phase } => state
                .get("currentPhase")
                .and_then(Value::as_str)
                .is_some_and(|current| phase.contains(current)),
            Condition::Step { step } => state
                .get("currentStep")
                .and_then(Value::as_str)
                .is_some_and(|current| current == step),
            Condition::Field {
                path,
                operator,
                value,
            } => compare(*operator, field::resolve_in_state(state, path).as_ref(), value.as_ref()),
            Condition::And { conditions } => conditions.iter().all(|c| c.evaluate(state)),
            Condition::Or { conditions } => conditions.iter().any(|c| c.evaluate(state)),
            Condition::Not { condition } => !condition.evaluate(state),
        }
    }

    /// Field paths this condition expects a snapshot to carry. Paths only
    /// tested with `exists` are left out; they are optional by construction.
    pub fn required_paths(&self) -> Vec<&str> {
        let mut paths = Vec::new();
        self.collect_paths(&mut paths);
        paths
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::Field { operator: Operator::Exists, .. } => {}
            Condition::Field { path, .. } => out.push(path),
            Condition::And { conditions } | Condition::Or { conditions } => {
                for c in conditions {
                    c.collect_paths(out);
                }
            }
            Condition::Not { condition } => condition.collect_paths(out),
            Condition::Phase { .. } | Condition::Step { .. } => {}
        }
    }
}

fn compare(operator: Operator, actual: Option<&Value>, expected: Option<&Value>) -> bool {
    let present = actual.is_some_and(|v| !v.is_null());
    match operator {
        Operator::Exists => match expected {
            Some(Value::Bool(false)) => !present,
            _ => present,
        },
        Operator::Equals => match (actual, expected) {
            (Some(a), Some(e)) => loose_eq(a, e),
            (None, Some(Value::Null)) => true,
            _ => false,
        },
        Operator::GreaterThan => order(actual, expected) == Some(Ordering::Greater),
        Operator::LessThan => order(actual, expected) == Some(Ordering::Less),
        Operator::Contains => match (actual, expected) {
            (Some(Value::Array(items)), Some(e)) => items.iter().any(|i| loose_eq(i, e)),
            (Some(Value::String(s)), Some(Value::String(e))) => s.contains(e.as_str()),
            (Some(Value::Object(map)), Some(Value::String(key))) => map.contains_key(key),
            _ => false,
        },
    }
}

/// Equality that treats `2` and `2.0` as the same number.
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Numbers compare numerically, strings lexically (ISO timestamps sort
/// correctly); anything else is unordered.
fn order(actual: Option<&Value>, expected: Option<&Value>) -> Option<Ordering> {
    match (actual?, expected?) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
