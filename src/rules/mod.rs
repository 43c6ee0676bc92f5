//! Declarative next-step rules.
//!
//! Rules are loaded from JSON files, matched against a serialised snapshot,
//! ranked by priority and rendered into suggestions. Evaluation is pure apart
//! from the injected [`CooldownStore`].

mod action;
mod condition;
mod cooldown;
mod engine;
pub mod loader;

pub use action::{Action, TemplateRef};
pub use condition::{Condition, OneOrMany, Operator};
pub use cooldown::{CooldownStore, FileCooldowns, MemoryCooldowns};
pub use engine::{Rule, RuleEngine, Suggestion, DEFAULT_COOLDOWN, MAX_COOLDOWN_SECS};
pub use loader::RuleSource;
