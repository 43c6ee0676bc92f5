//! One workflow instance on disk: its store, detector and rule engine.
//!
//! Ties the pieces together in the order every command follows: load the
//! snapshot, reconcile it against the instance directory, mutate, evaluate
//! rules, persist.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::Config;
use crate::detector::{EntityMapping, StateDetector, SyncOutcome};
use crate::rules::{loader, FileCooldowns, RuleEngine, RuleSource, Suggestion};
use crate::store::StateStore;
use crate::workflow::{WorkflowSchema, WorkflowState};
use crate::{klog, Result};

/// Rule sources for a workflow: the built-in files, then every configured
/// rules directory.
pub fn rule_sources(config: &Config) -> Vec<RuleSource> {
    let mut sources = loader::builtin_sources();
    sources.extend(
        config
            .rules_dirs()
            .into_iter()
            .filter(|dir| dir.exists())
            .map(RuleSource::path),
    );
    sources
}

/// Schema mappings followed by the configured overrides for its type.
pub fn entity_mappings(schema: &WorkflowSchema, config: &Config) -> Vec<EntityMapping> {
    let mut mappings = schema.entities.clone();
    mappings.extend(config.entities_for(&schema.workflow_type));
    mappings
}

pub struct Instance<T> {
    dir: PathBuf,
    store: StateStore<T>,
    detector: StateDetector,
    engine: RuleEngine,
    max_suggestions: usize,
}

impl<T> Instance<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Open the instance rooted at `dir`.
    ///
    /// Rules are loaded from the built-in and configured sources, and every
    /// field path they reference is checked against a freshly initialised
    /// snapshot of this workflow type. Cooldowns persist inside the state
    /// directory.
    pub fn open(dir: impl Into<PathBuf>, schema: WorkflowSchema, config: &Config) -> Result<Self> {
        let dir = dir.into();
        let rules = loader::load(&rule_sources(config), &schema.workflow_type)?;

        let probe = WorkflowState::new(&schema, "probe", T::default())?.to_value()?;
        let detector = StateDetector::for_instance(&dir, entity_mappings(&schema, config));
        let store = StateStore::with_config(PathBuf::new(), schema, config);

        let state_dir = store.instance_dir(&dir).join(&config.state_dir);
        let engine = RuleEngine::new(rules)?
            .with_default_cooldown(config.default_cooldown())
            .with_cooldowns(Box::new(
                FileCooldowns::in_state_dir(&state_dir).with_lock_timeout(config.lock_timeout()),
            ));
        engine.validate_paths(&probe)?;

        Ok(Self {
            dir,
            store,
            detector,
            engine,
            max_suggestions: config.max_suggestions,
        })
    }

    /// Replace the rule engine, e.g. with in-memory cooldowns.
    #[must_use]
    pub fn with_engine(mut self, engine: RuleEngine) -> Self {
        self.engine = engine;
        self
    }

    #[must_use]
    pub fn with_detector(mut self, detector: StateDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn store(&self) -> &StateStore<T> {
        &self.store
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    pub fn state_path(&self) -> PathBuf {
        self.store.state_path(&self.dir)
    }

    pub fn initialize(&self, name: &str) -> Result<WorkflowState<T>> {
        self.store.initialize(&self.dir, name)
    }

    pub fn state(&self) -> Result<WorkflowState<T>> {
        self.store.read(&self.dir)
    }

    pub fn update<F>(&self, f: F) -> Result<WorkflowState<T>>
    where
        F: FnMut(WorkflowState<T>) -> Result<WorkflowState<T>>,
    {
        self.store.update(&self.dir, f)
    }

    /// Reconcile the snapshot with the instance directory and persist any
    /// additions. Nothing is written when the disk shows nothing new.
    pub fn sync(&self) -> Result<SyncOutcome<T>> {
        let outcome = self.detector.sync(self.state()?)?;
        if outcome.is_unchanged() {
            return Ok(outcome);
        }

        // Re-run against whatever snapshot the write lands on, so a
        // concurrent writer's changes are merged rather than replaced.
        let mut report = (Vec::new(), Vec::new());
        let state = self.update(|current| {
            let fresh = self.detector.sync(current)?;
            report = (fresh.changes, fresh.failures);
            Ok(fresh.state)
        })?;
        let (changes, failures) = report;
        klog!("Synced {}: {} change(s)", self.dir.display(), changes.len());
        Ok(SyncOutcome {
            state,
            changes,
            failures,
        })
    }

    /// Suggestions for the current snapshot, reconciled in memory first so
    /// they reflect what is on disk. The snapshot itself is not written.
    pub fn suggest(&self, max: Option<usize>) -> Result<Vec<Suggestion>> {
        let state = self.detector.sync(self.state()?)?.state;
        self.engine.evaluate(&state, max.unwrap_or(self.max_suggestions))
    }
}
