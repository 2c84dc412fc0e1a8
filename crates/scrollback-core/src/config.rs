//! Configuration types for the scrollback engine and soak driver.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Error, Result};

/// Top-level configuration loaded from a YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ScrollbackConfig {
    /// Backlog sizing
    pub backlog: BacklogSettings,
    /// Soak driver settings
    pub soak: SoakSettings,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ScrollbackConfig {
    fn default() -> Self {
        Self {
            backlog: BacklogSettings::default(),
            soak: SoakSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

impl ScrollbackConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ScrollbackConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// JSON Schema describing the YAML configuration file.
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(ScrollbackConfig)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        self.backlog.validate()?;
        self.soak.validate()?;
        Ok(())
    }
}

/// Backlog sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct BacklogSettings {
    /// Rows retained by a newly created session buffer
    pub default_capacity: usize,
    /// Largest capacity a session buffer may be created or resized to;
    /// larger requests are clamped by the backlog
    pub max_capacity: usize,
}

impl Default for BacklogSettings {
    fn default() -> Self {
        Self {
            default_capacity: 2000,
            max_capacity: 100_000,
        }
    }
}

impl BacklogSettings {
    /// Validate sizing bounds.
    pub fn validate(&self) -> Result<()> {
        if self.max_capacity == 0 {
            return Err(Error::Config("backlog.max_capacity must be > 0".into()));
        }
        if self.default_capacity > self.max_capacity {
            return Err(Error::Config(format!(
                "backlog.default_capacity ({}) exceeds backlog.max_capacity ({})",
                self.default_capacity, self.max_capacity
            )));
        }
        Ok(())
    }
}

/// Soak driver settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SoakSettings {
    /// Number of simulated terminal sessions
    pub sessions: usize,
    /// Rows each session archives
    pub rows_per_session: usize,
    /// Width of archived rows
    pub columns: usize,
    /// Memory sampling period in milliseconds
    pub sample_interval_ms: u64,
}

impl Default for SoakSettings {
    fn default() -> Self {
        Self {
            sessions: 4,
            rows_per_session: 10_000,
            columns: 80,
            sample_interval_ms: 50,
        }
    }
}

impl SoakSettings {
    /// Validate soak settings.
    pub fn validate(&self) -> Result<()> {
        if self.sessions == 0 {
            return Err(Error::Config("soak.sessions must be > 0".into()));
        }
        if self.columns == 0 {
            return Err(Error::Config("soak.columns must be > 0".into()));
        }
        if self.sample_interval_ms == 0 {
            return Err(Error::Config("soak.sample_interval_ms must be > 0".into()));
        }
        Ok(())
    }
}
