//! Configuration loading for the Inventory Warden CLI.

use anyhow::{Context, Result};
use iw_core::RawEngineSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Engine settings (permitted subnets, primary-IP policy, relation rules).
    #[serde(default)]
    pub engine: RawEngineSettings,

    /// Configured inventory sources, keyed by source name.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: RawEngineSettings::default(),
            sources: BTreeMap::new(),
            logging: LoggingSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Saves configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_yaml::to_string(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// One configured inventory source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source type (currently only "static-file").
    pub source_type: String,

    /// Path to the inventory document (static-file sources).
    #[serde(default)]
    pub path: String,

    /// Whether this source participates in runs.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether to resolve PTR names for addresses from this source.
    #[serde(default)]
    pub resolve_hostnames: bool,

    /// DNS servers to query instead of the system resolver.
    #[serde(default)]
    pub dns_servers: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to emit JSON-formatted logs.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
