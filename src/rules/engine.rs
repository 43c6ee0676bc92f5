//! Rule evaluation: match, rank, truncate, cool down.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workflow::WorkflowState;
use crate::{field, klog_debug, Error, Result};

use super::action::Action;
use super::condition::Condition;
use super::cooldown::{CooldownStore, MemoryCooldowns};

/// Cooldown applied to rules that do not set `cooldownSecs`.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

/// Longest cooldown a rule may declare: ten years.
pub const MAX_COOLDOWN_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// A declarative condition/action pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    pub condition: Condition,
    pub action: Action,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Overrides the engine's default cooldown. Zero disables the cooldown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_secs: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

impl Rule {
    pub fn new(id: &str, name: &str, priority: i32, condition: Condition, action: Action) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            priority,
            condition,
            action,
            enabled: true,
            cooldown_secs: None,
        }
    }

    #[must_use]
    pub fn with_cooldown_secs(mut self, secs: u64) -> Self {
        self.cooldown_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Reject a `cooldownSecs` beyond [`MAX_COOLDOWN_SECS`].
    pub fn check_cooldown(&self) -> std::result::Result<(), String> {
        match self.cooldown_secs {
            Some(secs) if secs > MAX_COOLDOWN_SECS => Err(format!(
                "rule '{}' cooldownSecs {} exceeds the maximum of {}",
                self.id, secs, MAX_COOLDOWN_SECS
            )),
            _ => Ok(()),
        }
    }
}

/// One ranked, rendered suggestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub rule_id: String,
    pub rule_name: String,
    pub priority: i32,
    pub action: Action,
    /// Placeholders left literal because their path did not resolve.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<String>,
}

/// Holds the rule set for one workflow type and evaluates snapshots
/// against it.
pub struct RuleEngine {
    rules: Vec<Rule>,
    cooldowns: Box<dyn CooldownStore>,
    default_cooldown: Duration,
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine")
            .field("rules", &self.rules.len())
            .field("default_cooldown", &self.default_cooldown)
            .finish()
    }
}

impl RuleEngine {
    /// Engine over `rules` with in-memory cooldowns. Fails on duplicate ids.
    pub fn new(rules: Vec<Rule>) -> Result<Self> {
        let mut engine = Self {
            rules: Vec::new(),
            cooldowns: Box::new(MemoryCooldowns::new()),
            default_cooldown: DEFAULT_COOLDOWN,
        };
        engine.add_rules(rules)?;
        Ok(engine)
    }

    #[must_use]
    pub fn with_cooldowns(mut self, cooldowns: Box<dyn CooldownStore>) -> Self {
        self.cooldowns = cooldowns;
        self
    }

    #[must_use]
    pub fn with_default_cooldown(mut self, cooldown: Duration) -> Self {
        self.default_cooldown = cooldown;
        self
    }

    /// Append another rule source. Ids must stay unique across sources and
    /// cooldowns must be in range; nothing is added if either check fails.
    pub fn add_rules(&mut self, rules: Vec<Rule>) -> Result<()> {
        let mut seen: HashSet<String> = self.rules.iter().map(|r| r.id.clone()).collect();
        for rule in &rules {
            if !seen.insert(rule.id.clone()) {
                return Err(Error::DuplicateRule(rule.id.clone()));
            }
            rule.check_cooldown().map_err(|reason| Error::RuleLoad {
                source_name: rule.id.clone(),
                reason,
            })?;
        }
        self.rules.extend(rules);
        Ok(())
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn cooldowns(&self) -> &dyn CooldownStore {
        self.cooldowns.as_ref()
    }

    /// Check every referenced field path against a probe snapshot.
    ///
    /// Template placeholders marked with `?` and `exists` conditions are
    /// skipped. Anything else that cannot plausibly resolve is reported as
    /// `InvalidTemplatePath` so typos surface when rules are loaded rather
    /// than as literal placeholders later.
    pub fn validate_paths(&self, probe: &Value) -> Result<()> {
        for rule in &self.rules {
            let template_paths = rule
                .action
                .template_refs()
                .into_iter()
                .filter(|r| !r.optional)
                .map(|r| r.path);
            let condition_paths = rule.condition.required_paths().into_iter().map(str::to_string);
            for path in condition_paths.chain(template_paths) {
                if !field::is_plausible_in_state(probe, &path) {
                    return Err(Error::InvalidTemplatePath {
                        rule: rule.id.clone(),
                        path,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn evaluate<T: Serialize>(&self, state: &WorkflowState<T>, max: usize) -> Result<Vec<Suggestion>> {
        self.evaluate_at(&state.to_value()?, max, Utc::now())
    }

    /// Evaluate a serialised snapshot at a fixed instant.
    ///
    /// Matches are ranked by priority, highest first, with ties broken by
    /// ascending rule id. Only the returned suggestions start a cooldown, and
    /// only once every expiry has been computed, so a failing call leaves no
    /// rule cooling down.
    pub fn evaluate_at(&self, state: &Value, max: usize, now: DateTime<Utc>) -> Result<Vec<Suggestion>> {
        let mut matched: Vec<&Rule> = self
            .rules
            .iter()
            .filter(|r| r.enabled)
            .filter(|r| {
                let cooling = self.cooldowns.is_cooling(&r.id, now);
                if cooling {
                    klog_debug!("Rule {} cooling down", r.id);
                }
                !cooling
            })
            .filter(|r| r.condition.evaluate(state))
            .collect();

        matched.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        matched.truncate(max);

        let mut expiries = Vec::with_capacity(matched.len());
        for rule in &matched {
            if let Some(until) = self.cooldown_until(rule, now)? {
                expiries.push((rule.id.as_str(), until));
            }
        }

        let mut suggestions = Vec::with_capacity(matched.len());
        for rule in matched {
            let (action, unresolved) = rule.action.render(state);
            if !unresolved.is_empty() {
                klog_debug!("Rule {} left unresolved placeholders: {:?}", rule.id, unresolved);
            }
            suggestions.push(Suggestion {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                priority: rule.priority,
                action,
                unresolved,
            });
        }

        for (id, until) in expiries {
            self.cooldowns.start(id, until)?;
        }

        klog_debug!("RuleEngine: {} suggestion(s)", suggestions.len());
        Ok(suggestions)
    }

    /// When `rule` stops cooling down if it fires at `now`; `None` for no
    /// cooldown.
    fn cooldown_until(&self, rule: &Rule, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let cooldown = rule
            .cooldown_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_cooldown);
        if cooldown.is_zero() {
            return Ok(None);
        }
        chrono::Duration::from_std(cooldown)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .map(Some)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "cooldown of {}s for rule '{}' is out of range",
                    cooldown.as_secs(),
                    rule.id
                ))
            })
    }
}
