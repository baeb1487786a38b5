//! Recovery configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via TXLOG_CONFIG or --config)
//! 3. Environment variables

use crate::pruner::RetentionPruner;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory holding the log and the transaction-id state.
    pub data_dir: PathBuf,
    /// Passed to the recovery run with `Recovery::with_config(config.recovery)`.
    pub recovery: RecoveryConfig,
    /// `config.retention.pruner()` supplies `Recovery::with_pruner`.
    pub retention: RetentionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            recovery: RecoveryConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("TXLOG_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    /// Applies environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("TXLOG_DATA") {
            self.data_dir = PathBuf::from(dir);
        }
        self.recovery.apply_env_overrides();
        self.retention.apply_env_overrides();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "data_dir must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the log directory path.
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("wal")
    }

    /// Returns the transaction-id state file path.
    pub fn tx_state_path(&self) -> PathBuf {
        self.data_dir.join("txstate.json")
    }
}

/// Recovery behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Append a checkpoint once recovery has forced the storage engine, so
    /// the next startup finds a clean log.
    pub checkpoint_after_recovery: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            checkpoint_after_recovery: true,
        }
    }
}

impl RecoveryConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("TXLOG_CHECKPOINT_AFTER_RECOVERY") {
            self.checkpoint_after_recovery = parse_flag(&value);
        }
    }
}

/// Log segment retention after recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Delete old segments once recovery completes.
    pub enabled: bool,
    /// Segments older than the recovery checkpoint to keep.
    pub keep_segments: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            keep_segments: 2,
        }
    }
}

impl RetentionConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("TXLOG_PRUNE") {
            self.enabled = parse_flag(&value);
        }
        if let Ok(value) = std::env::var("TXLOG_KEEP_SEGMENTS") {
            if let Ok(n) = value.parse() {
                self.keep_segments = n;
            }
        }
    }

    /// Returns the pruner to run after recovery, if retention is enabled.
    pub fn pruner(&self) -> Option<RetentionPruner> {
        self.enabled.then(|| RetentionPruner::new(self.keep_segments))
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    Parse(PathBuf, #[source] serde_yaml::Error),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}
