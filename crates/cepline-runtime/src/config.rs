//! Engine configuration loaded from YAML or TOML
//!
//! # Example YAML configuration:
//! ```yaml
//! windows:
//!   flush_on_complete: emit_partial
//!   max_open_intervals: 64
//!
//! logging:
//!   level: debug
//!   format: json
//! ```

use crate::window::FlushPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Window operator defaults
    pub windows: WindowConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Defaults applied to window operators built with `with_config`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WindowConfig {
    /// What count, temporal and interval windows do with a partial
    /// window when the upstream completes
    pub flush_on_complete: FlushPolicy,

    /// Bound on concurrently open event-interval windows; the oldest is
    /// emitted early when exceeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_open_intervals: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,

    /// Include timestamps
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            timestamps: true,
        }
    }
}

impl Config {
    /// Load configuration from a file (YAML or TOML, auto-detected by extension)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml(&content),
            "toml" => Self::from_toml(&content),
            _ => Self::from_yaml(&content).or_else(|_| Self::from_toml(&content)),
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Merge another config into this one (other values take precedence if set)
    pub fn merge(&mut self, other: Config) {
        let window_defaults = WindowConfig::default();
        if other.windows.flush_on_complete != window_defaults.flush_on_complete {
            self.windows.flush_on_complete = other.windows.flush_on_complete;
        }
        if other.windows.max_open_intervals.is_some() {
            self.windows.max_open_intervals = other.windows.max_open_intervals;
        }

        let log_defaults = LoggingConfig::default();
        if other.logging.level != log_defaults.level {
            self.logging.level = other.logging.level;
        }
        if other.logging.format != log_defaults.format {
            self.logging.format = other.logging.format;
        }
        if !other.logging.timestamps {
            self.logging.timestamps = false;
        }
    }

    pub fn example() -> Self {
        Self {
            windows: WindowConfig {
                flush_on_complete: FlushPolicy::EmitPartial,
                max_open_intervals: Some(64),
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: "json".to_string(),
                timestamps: true,
            },
        }
    }

    pub fn example_yaml() -> String {
        serde_yaml::to_string(&Self::example()).unwrap_or_default()
    }

    pub fn example_toml() -> String {
        toml::to_string_pretty(&Self::example()).unwrap_or_default()
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    IoError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),
}
