pub mod bluetooth_config;
pub mod network_config;

use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::config::bluetooth_config::BluetoothConfig;
use crate::config::network_config::NetworkConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub bluetooth: BluetoothConfig,
    /// Default log filter; `RUST_LOG` takes precedence.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            network: NetworkConfig::default(),
            bluetooth: BluetoothConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads the config from a JSON file. Missing fields take their defaults;
    /// a missing file yields the default config.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Config file not found at {:?}, using default.", path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Self = serde_json::from_str(&config_json)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;

        info!("Config loaded from {:?}", path);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::publish::server::Transport;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"network": {"transport": "udp"}, "log_level": "debug"}"#).expect("parse");
        assert_eq!(config.network.transport, Transport::Udp);
        assert_eq!(config.network.port, NetworkConfig::default().port);
        assert_eq!(config.bluetooth, BluetoothConfig::default());
        assert_eq!(config.log_level, "debug");
    }

    #[tokio::test]
    async fn missing_file_yields_default() {
        let path = std::env::temp_dir().join("ble-bridge-config-that-does-not-exist.json");
        let config = AppConfig::load(&path).await.expect("default");
        assert_eq!(config, AppConfig::default());
    }

    #[tokio::test]
    async fn malformed_file_names_the_path() {
        let path = std::env::temp_dir().join(format!("ble-bridge-malformed-{}.json", std::process::id()));
        fs::write(&path, "{ not json").await.expect("write");
        let err = AppConfig::load(&path).await.expect_err("malformed");
        let _ = fs::remove_file(&path).await;
        assert!(err.to_string().contains("ble-bridge-malformed"));
    }
}
