//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use plinth_types::{NodeId, Version};

use crate::NodeError;

/// Configuration for a Plinth node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This node's name as recorded on the Pool ledger.
    #[serde(default = "default_name")]
    pub name: String,

    /// Data directory for stores that must survive restart.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Version of the running binary, compared against upgrade schedules.
    #[serde(default = "default_version")]
    pub running_version: String,

    /// Retry advisory attached to read-only pool rejections, in seconds.
    #[serde(default = "default_readonly_retry_secs")]
    pub readonly_retry_secs: u64,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_name() -> String {
    "plinth-node".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./plinth_data")
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_readonly_retry_secs() -> u64 {
    60
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn node_id(&self) -> NodeId {
        NodeId::new(self.name.clone())
    }

    pub fn running_version(&self) -> Version {
        Version::new(self.running_version.clone())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            running_version: default_version(),
            readonly_retry_secs: default_readonly_retry_secs(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}
