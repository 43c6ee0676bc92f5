use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detector::EntityMapping;
use crate::{klog_debug, Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory under each instance that holds the snapshot.
    pub state_dir: String,
    pub state_file: String,
    /// Extra directories of rule files, loaded after the built-in rules.
    pub rules_dirs: Vec<String>,
    pub max_suggestions: usize,
    pub default_cooldown_secs: u64,
    pub lock_timeout_ms: u64,
    /// Entity mappings appended to the workflow type's defaults.
    pub entities: Vec<EntityOverride>,
}

/// An `[[entities]]` table scoped to one workflow type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityOverride {
    pub workflow_type: String,
    #[serde(flatten)]
    pub mapping: EntityMapping,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: ".workflow".to_string(),
            state_file: "state.json".to_string(),
            rules_dirs: Vec::new(),
            max_suggestions: 5,
            default_cooldown_secs: 300,
            lock_timeout_ms: 2000,
            entities: Vec::new(),
        }
    }
}

impl Config {
    pub fn keel_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".keel"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::keel_dir()?.join("keel.toml"))
    }

    /// Load from `~/.keel/keel.toml`, falling back to defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        klog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            klog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        klog_debug!(
            "Config loaded: state_dir={}, rules_dirs={:?}, max_suggestions={}",
            config.state_dir,
            config.rules_dirs,
            config.max_suggestions
        );
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        klog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn rules_dirs(&self) -> Vec<PathBuf> {
        self.rules_dirs.iter().map(|d| expand_tilde(d)).collect()
    }

    pub fn default_cooldown(&self) -> Duration {
        Duration::from_secs(self.default_cooldown_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Entity overrides that apply to `workflow_type`.
    pub fn entities_for(&self, workflow_type: &str) -> Vec<EntityMapping> {
        self.entities
            .iter()
            .filter(|e| e.workflow_type == workflow_type)
            .map(|e| e.mapping.clone())
            .collect()
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
