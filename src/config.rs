//! Configuration loading and tunables.
//!
//! Values come from three layers, lowest priority first:
//! 1. Built-in defaults
//! 2. The YAML config file (`TASKRANK_CONFIG_PATH`, else `./taskrank.yaml`)
//! 3. Environment variables `TASKRANK_DB_PATH`, `TASKRANK_UNDO_LIMIT`
//!
//! [`Tunables::resolve`] then overlays values stored in the settings table.

use crate::db::Database;
use crate::db::settings::SettingValue;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const KEY_K_FACTOR_BASE: &str = "priority.k_factor_base";
pub const KEY_K_FACTOR_NEW: &str = "priority.k_factor_new";
pub const KEY_NEW_TASK_THRESHOLD: &str = "priority.new_task_threshold";
pub const KEY_COMPARISON_DECREMENT: &str = "priority.comparison_decrement";
pub const KEY_UNDO_MAX_SIZE: &str = "history.max_size";

/// Core configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub priority: PriorityConfig,

    #[serde(default)]
    pub history: HistoryConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("taskrank").join("tasks.db"))
        .unwrap_or_else(|| PathBuf::from(".taskrank/tasks.db"))
}

/// Pairwise comparison settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityConfig {
    #[serde(default = "default_k_factor_base")]
    pub k_factor_base: f64,

    /// K-factor for tasks with fewer than `new_task_threshold` comparisons.
    #[serde(default = "default_k_factor_new")]
    pub k_factor_new: f64,

    #[serde(default = "default_new_task_threshold")]
    pub new_task_threshold: i64,

    /// Rating lost when a task is passed over without an opponent.
    #[serde(default = "default_comparison_decrement")]
    pub comparison_decrement: f64,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            k_factor_base: default_k_factor_base(),
            k_factor_new: default_k_factor_new(),
            new_task_threshold: default_new_task_threshold(),
            comparison_decrement: default_comparison_decrement(),
        }
    }
}

fn default_k_factor_base() -> f64 {
    32.0
}

fn default_k_factor_new() -> f64 {
    64.0
}

fn default_new_task_threshold() -> i64 {
    10
}

fn default_comparison_decrement() -> f64 {
    16.0
}

/// Undo history settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_max_size")]
    pub max_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
        }
    }
}

fn default_max_size() -> usize {
    50
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from default locations or return defaults,
    /// then apply environment overrides.
    pub fn load_or_default() -> Self {
        let path = std::env::var("TASKRANK_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("taskrank.yaml"));

        let mut config = match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                if path.exists() {
                    warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
                }
                Self::default()
            }
        };
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(db_path) = std::env::var("TASKRANK_DB_PATH") {
            self.storage.db_path = PathBuf::from(db_path);
        }

        if let Ok(limit) = std::env::var("TASKRANK_UNDO_LIMIT") {
            if let Ok(limit) = limit.parse() {
                self.history.max_size = limit;
            }
        }
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.storage.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

/// Values consumed by the core at run time.
#[derive(Debug, Clone, PartialEq)]
pub struct Tunables {
    pub k_factor_base: f64,
    pub k_factor_new: f64,
    pub new_task_threshold: i64,
    pub comparison_decrement: f64,
    pub undo_max_size: usize,
}

impl From<&Config> for Tunables {
    fn from(config: &Config) -> Self {
        Self {
            k_factor_base: config.priority.k_factor_base,
            k_factor_new: config.priority.k_factor_new,
            new_task_threshold: config.priority.new_task_threshold,
            comparison_decrement: config.priority.comparison_decrement,
            undo_max_size: config.history.max_size,
        }
    }
}

impl Default for Tunables {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl Tunables {
    /// Config values overlaid with any stored settings.
    pub fn resolve(db: &Database, config: &Config) -> Result<Self> {
        let mut tunables = Self::from(config);

        if let Some(v) = db.get_setting(KEY_K_FACTOR_BASE)? {
            tunables.k_factor_base = expect_float(KEY_K_FACTOR_BASE, v)?;
        }
        if let Some(v) = db.get_setting(KEY_K_FACTOR_NEW)? {
            tunables.k_factor_new = expect_float(KEY_K_FACTOR_NEW, v)?;
        }
        if let Some(v) = db.get_setting(KEY_NEW_TASK_THRESHOLD)? {
            tunables.new_task_threshold = expect_integer(KEY_NEW_TASK_THRESHOLD, v)?;
        }
        if let Some(v) = db.get_setting(KEY_COMPARISON_DECREMENT)? {
            tunables.comparison_decrement = expect_float(KEY_COMPARISON_DECREMENT, v)?;
        }
        if let Some(v) = db.get_setting(KEY_UNDO_MAX_SIZE)? {
            let size = expect_integer(KEY_UNDO_MAX_SIZE, v)?;
            tunables.undo_max_size = usize::try_from(size)
                .map_err(|_| Error::validation("history.max_size", "must not be negative"))?;
        }

        debug!(?tunables, "resolved tunables");
        Ok(tunables)
    }
}

fn expect_float(key: &'static str, value: SettingValue) -> Result<f64> {
    match value {
        SettingValue::Float(f) => Ok(f),
        SettingValue::Integer(i) => Ok(i as f64),
        other => Err(Error::validation(
            key,
            format!("expected a number, found {}", other.type_name()),
        )),
    }
}

fn expect_integer(key: &'static str, value: SettingValue) -> Result<i64> {
    match value {
        SettingValue::Integer(i) => Ok(i),
        other => Err(Error::validation(
            key,
            format!("expected an integer, found {}", other.type_name()),
        )),
    }
}
