//! # Configuration
//!
//! JSON configuration for the logger and the diagnostics listener. Every
//! field has a default, so `{}` is a valid file.
//!
//! ```json
//! {
//!   "logging": { "min_severity": "info" },
//!   "diagnostics": { "enabled": true, "capacity": 64 }
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::{Event, Logger, Severity};

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(String),

    #[error("Invalid config JSON: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Logger settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Lowest severity written (default: info)
    #[serde(default = "default_min_severity")]
    pub min_severity: Severity,
}

fn default_min_severity() -> Severity {
    Severity::Info
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            min_severity: default_min_severity(),
        }
    }
}

/// Diagnostics listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Attach a diagnostics listener (default: true)
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Records kept in the buffer (default: 64)
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_capacity() -> usize {
    64
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            capacity: default_capacity(),
        }
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LivedocConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

impl LivedocConfig {
    /// Load and validate configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config = Self::from_json(&content)?;
        Event::ConfigLoaded.emit(&[("path", path.display().to_string().as_str())]);
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: LivedocConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.diagnostics.enabled && self.diagnostics.capacity == 0 {
            return Err(ConfigError::Invalid(
                "diagnostics.capacity must be > 0 when diagnostics are enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply process-wide settings
    pub fn apply(&self) {
        Logger::set_min_severity(self.logging.min_severity);
    }
}
