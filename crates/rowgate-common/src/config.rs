//! Configuration management for rowgate

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Main configuration structure for rowgate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Sync/async bridge configuration
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Statement analysis configuration
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Event ledger configuration
    #[serde(default)]
    pub ledger: LedgerConfig,
}

impl Config {
    /// Load configuration from file
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

        let config: Config = if path.as_ref().extension().map_or(false, |ext| ext == "toml") {
            toml::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse TOML config: {e}")))?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse JSON config: {e}")))?
        };

        Ok(config)
    }

    /// Parse configuration from an embedded TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML config: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Name of the background loop thread
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
    /// Stack size for the loop thread (0 = platform default)
    #[serde(default)]
    pub stack_size_bytes: usize,
}

fn default_thread_name() -> String {
    "rowgate-bridge".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            stack_size_bytes: 0,
        }
    }
}

/// What to do when an executed statement carries no entity registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingRegistryPolicy {
    /// Fail the statement
    #[default]
    Deny,
    /// Log and let the statement run unfiltered
    Bypass,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub missing_registry: MissingRegistryPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Initial capacity of the per-transaction map
    #[serde(default = "default_ledger_capacity")]
    pub initial_capacity: usize,
}

fn default_ledger_capacity() -> usize {
    64
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            initial_capacity: default_ledger_capacity(),
        }
    }
}
