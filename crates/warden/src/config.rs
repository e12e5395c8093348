//! Daemon configuration

use anyhow::Result;
use serde::Deserialize;
use warden_lib::WardenConfig;

/// Daemon process configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// API server port for ingestion, queries, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// This node's identity in the cluster
    #[serde(default)]
    pub node_id: u64,
}

fn default_api_port() -> u16 {
    8080
}

impl DaemonConfig {
    /// Load from `WARDEN_*` environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("WARDEN").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|_| DaemonConfig {
            api_port: default_api_port(),
            node_id: 0,
        }))
    }

    /// Load the warden thresholds from the same environment, stamping in
    /// this node's identity
    pub fn load_limits(&self) -> Result<WardenConfig> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("WARDEN").try_parsing(true))
            .build()?;

        let mut limits: WardenConfig = config
            .try_deserialize()
            .unwrap_or_else(|_| WardenConfig::default());
        limits.node_id = self.node_id;
        Ok(limits)
    }
}
