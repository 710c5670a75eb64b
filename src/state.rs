//! Application state management
//! Wires the live Bluetooth and network providers into a running bridge store.

use std::sync::Arc;

use anyhow::Result;
use log::info;

use crate::config::AppConfig;
use crate::core::bridge::BridgeState;
use crate::core::store::{self, BridgeHandle};
use crate::core::{BluetoothManager, NetworkServer};

/// Global application state
pub struct AppState {
    pub bridge: BridgeHandle,
    pub config: AppConfig,
}

impl AppState {
    /// Opens the host adapter and starts the bridge. Fails when no adapter
    /// is present.
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("Initializing BluetoothManager...");
        let manager = BluetoothManager::new(config.bluetooth.availability_timeout()).await?;
        let server = Arc::new(NetworkServer::new(config.network.receive_chunk_size));

        let initial = BridgeState::new(config.network.server_settings());
        let bridge = store::spawn(manager.providers(server), config.bluetooth.timing(), initial);
        Ok(Self { bridge, config })
    }

    pub async fn shutdown(self) {
        self.bridge.shutdown().await;
    }
}
