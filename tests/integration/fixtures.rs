//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Temporary project instances with a store and detector
//! - Seeding goal and workflow files on disk
//! - Canned rule documents

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use keel::config::Config;
use keel::project::{self, ProjectCustomData, ProjectState};
use keel::rules::{MemoryCooldowns, RuleEngine, RuleSource};
use keel::store::StateStore;
use keel::Instance;

/// A project instance in a temporary directory.
pub struct TestProject {
    /// Keeps the directory alive for the duration of the test.
    pub temp_dir: TempDir,
    pub path: PathBuf,
}

impl TestProject {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().to_path_buf();
        Self { temp_dir, path }
    }

    /// Store with an empty root, so the instance id is the absolute
    /// instance directory itself.
    pub fn store(&self) -> StateStore<ProjectCustomData> {
        StateStore::new(PathBuf::new(), project::schema())
    }

    /// Instance with built-in rules and in-memory cooldowns.
    pub fn instance(&self) -> Instance<ProjectCustomData> {
        let instance = Instance::open(&self.path, project::schema(), &Config::default())
            .expect("Failed to open instance");
        let rules = instance.engine().rules().to_vec();
        let engine = RuleEngine::new(rules)
            .expect("Failed to build engine")
            .with_cooldowns(Box::new(MemoryCooldowns::new()));
        instance.with_engine(engine)
    }

    pub fn initialize(&self, name: &str) -> ProjectState {
        self.store()
            .initialize(&self.path, name)
            .expect("Failed to initialize project")
    }

    pub fn state_path(&self) -> PathBuf {
        self.store().state_path(&self.path)
    }

    pub fn add_selected_goal(&self, id: &str) {
        mkdir(&self.path.join("02-goals-and-roadmap/selected-goals").join(id));
    }

    pub fn add_potential_goal(&self, id: &str) {
        let dir = self.path.join("02-goals-and-roadmap/potential-goals");
        mkdir(&dir);
        fs::write(dir.join(format!("{}.md", id)), format!("# {}\n", id)).expect("Failed to write goal");
    }

    pub fn add_workflow(&self, id: &str) {
        mkdir(&self.path.join("temp/workflows").join(id));
    }
}

fn mkdir(path: &Path) {
    fs::create_dir_all(path).expect("Failed to create directory");
}

/// Two rules that both match any project in goal development.
pub const RANKED_RULES: &str = r#"{
  "workflowType": "project",
  "rules": [
    { "id": "rank.low", "name": "Low", "priority": 70, "cooldownSecs": 0,
      "condition": { "type": "phase", "phase": "goal-development" },
      "action": { "type": "message", "text": "low" } },
    { "id": "rank.high", "name": "High", "priority": 90, "cooldownSecs": 0,
      "condition": { "type": "phase", "phase": "goal-development" },
      "action": { "type": "message", "text": "high" } }
  ]
}"#;

/// Rule sources holding one inline document.
pub fn inline(name: &str, json: &str) -> Vec<RuleSource> {
    vec![RuleSource::inline(name, json)]
}
