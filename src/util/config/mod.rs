//! Weft runtime configuration
//!
//! Optional RON config file with merge-over-defaults semantics: every
//! field has a default, so an empty or missing file yields the same
//! runtime as no file at all.
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high -> low):
//! 1. Values set in code on SchedulerConfig
//! 2. Config file (weft.ron, or $WEFT_CONFIG)
//! 3. Default values
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runtime::scheduler::SchedulerConfig;
use crate::util::logger::LogLevel;

/// Runtime configuration loaded from a RON file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    /// Logging settings
    #[serde(default)]
    pub log: LogSection,
    /// Scheduler settings
    #[serde(default)]
    pub scheduler: SchedulerSection,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSection {
    /// Log level name: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Scheduler configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSection {
    /// Grace period in milliseconds before an unresponsive bridge is fatal
    #[serde(default = "default_bridge_grace_ms")]
    pub bridge_grace_ms: u64,
    /// Idle poll interval in milliseconds
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
    /// Optional per-step delay in milliseconds (debugging aid)
    #[serde(default)]
    pub slowmo_ms: Option<u64>,
}

fn default_bridge_grace_ms() -> u64 {
    1000
}

fn default_idle_poll_ms() -> u64 {
    10
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            bridge_grace_ms: default_bridge_grace_ms(),
            idle_poll_ms: default_idle_poll_ms(),
            slowmo_ms: None,
        }
    }
}

impl RuntimeConfig {
    /// Parsed log level.
    #[inline]
    pub fn log_level(&self) -> LogLevel {
        LogLevel::parse(&self.log.level)
    }

    /// Convert the scheduler section into a [`SchedulerConfig`].
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            bridge_grace: Duration::from_millis(self.scheduler.bridge_grace_ms),
            idle_poll: Duration::from_millis(self.scheduler.idle_poll_ms),
            slowmo: self.scheduler.slowmo_ms.map(Duration::from_millis),
        }
    }
}

/// Get the config file path: `$WEFT_CONFIG` if set, else `weft.ron` in
/// the working directory.
pub fn config_path() -> PathBuf {
    std::env::var("WEFT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("weft.ron"))
}

/// Load configuration from the default location.
///
/// A missing file is not an error; defaults are returned.
pub fn load_config() -> Result<RuntimeConfig, ConfigError> {
    load_config_from(&config_path())
}

/// Load configuration from an explicit path.
pub fn load_config_from(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    if !path.exists() {
        return Ok(RuntimeConfig::default());
    }
    let content = fs::read_to_string(path)?;
    Ok(ron::from_str(&content)?)
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
}
