//! Bluetooth manager for the bridge.
//! Owns the host adapter, the BLE lane and the handle tables, and hands out
//! the live provider set.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use bluest::Adapter;
use log::info;

use crate::core::bluetooth::adapter::{LiveAuthorization, LiveRadio};
use crate::core::bluetooth::connection::ConnectionManager;
use crate::core::bluetooth::discovery::ServiceDiscovery;
use crate::core::bluetooth::handles::Handles;
use crate::core::bluetooth::lane::BleLane;
use crate::core::bluetooth::notification::NotificationHandler;
use crate::core::bluetooth::scanner::BluetoothScanner;
use crate::core::publish::server::Server;
use crate::core::store::Providers;

pub struct BluetoothManager {
    adapter: Adapter,
    lane: BleLane,
    handles: Handles,
    availability_timeout: Duration,
}

impl BluetoothManager {
    /// Opens the default adapter. Fails when the host has none.
    pub async fn new(availability_timeout: Duration) -> Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        info!("Bluetooth adapter opened.");
        Ok(Self { adapter, lane: BleLane::new(), handles: Handles::default(), availability_timeout })
    }

    /// Builds the live provider set around the given network server.
    pub fn providers(&self, server: Arc<dyn Server>) -> Providers {
        let scanner = Arc::new(BluetoothScanner::new(self.adapter.clone(), self.handles.clone()));
        Providers {
            radio: Arc::new(LiveRadio::new(self.adapter.clone(), self.availability_timeout)),
            authorization: Arc::new(LiveAuthorization),
            scanner: scanner.clone(),
            discoverer: scanner,
            peripherals: Arc::new(ConnectionManager::new(
                self.adapter.clone(),
                self.lane.clone(),
                self.handles.clone(),
            )),
            services: Arc::new(ServiceDiscovery::new(self.lane.clone(), self.handles.clone())),
            relay: Arc::new(NotificationHandler::new(self.lane.clone(), self.handles.clone())),
            server,
        }
    }
}
