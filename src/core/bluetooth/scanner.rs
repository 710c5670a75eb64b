//! Peripheral scanning with `bluest`.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use bluest::Adapter;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::constants::{DISCOVERY_EVENTS_CAPACITY, RSSI_UNAVAILABLE};
use crate::core::bluetooth::handles::Handles;
use crate::core::central::providers::{PeripheralDiscoverer, Scanner};
use crate::core::central::types::{DiscoveredPeripheral, PeripheralId};
use crate::core::streams::{broadcast_stream, watch_stream};
use crate::utils::lock;

pub struct BluetoothScanner {
    adapter: Adapter,
    handles: Handles,
    scanning: Arc<watch::Sender<bool>>,
    discovered: broadcast::Sender<DiscoveredPeripheral>,
    cancel_token: Arc<Mutex<Option<CancellationToken>>>,
}

impl BluetoothScanner {
    pub fn new(adapter: Adapter, handles: Handles) -> Self {
        let (scanning, _) = watch::channel(false);
        let (discovered, _) = broadcast::channel(DISCOVERY_EVENTS_CAPACITY);
        Self {
            adapter,
            handles,
            scanning: Arc::new(scanning),
            discovered,
            cancel_token: Arc::new(Mutex::new(None)),
        }
    }

    async fn internal_scan_task(
        adapter: Adapter,
        handles: Handles,
        discovered: broadcast::Sender<DiscoveredPeripheral>,
        scanning: Arc<watch::Sender<bool>>,
        cancel_token: CancellationToken,
    ) -> Result<()> {
        let mut scan_stream = adapter.scan(&[]).await?;
        if cancel_token.is_cancelled() {
            return Ok(());
        }
        scanning.send_replace(true);
        info!("Bluetooth scan running");

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                result = scan_stream.next() => match result {
                    Some(advertisement) => {
                        let device = advertisement.device;
                        let id = PeripheralId::new(device.id().to_string());
                        let name = advertisement.adv_data.local_name.or_else(|| device.name().ok());
                        let rssi = advertisement.rssi.unwrap_or(RSSI_UNAVAILABLE);
                        debug!("Found device - ID: {}, Name: {:?}, RSSI: {}", id, name, rssi);

                        handles.devices.insert(id.clone(), device);
                        // No receivers just means nobody is listening yet.
                        let _ = discovered.send(DiscoveredPeripheral { id, name, rssi });
                    }
                    None => {
                        info!("Bluetooth scan stream has ended.");
                        break;
                    }
                },
            }
        }
        Ok(())
    }
}

/// Frees the slot for the next start and reports the scan as stopped,
/// unless a newer scan already holds the slot.
fn finish_scan(
    slot: &Mutex<Option<CancellationToken>>,
    cancel_token: &CancellationToken,
    scanning: &watch::Sender<bool>,
) -> bool {
    cancel_token.cancel();
    let current = lock(slot);
    // A live token in the slot belongs to a later start.
    let ours = current.as_ref().is_none_or(CancellationToken::is_cancelled);
    if ours {
        scanning.send_replace(false);
    }
    ours
}

impl Scanner for BluetoothScanner {
    fn start(&self) {
        let mut current = lock(&self.cancel_token);
        if current.as_ref().is_some_and(|token| !token.is_cancelled()) {
            debug!("Scan already running");
            return;
        }
        let cancel_token = CancellationToken::new();
        *current = Some(cancel_token.clone());

        let adapter = self.adapter.clone();
        let handles = self.handles.clone();
        let discovered = self.discovered.clone();
        let scanning = self.scanning.clone();
        let slot = self.cancel_token.clone();
        tokio::spawn(async move {
            let result = Self::internal_scan_task(
                adapter,
                handles,
                discovered,
                scanning.clone(),
                cancel_token.clone(),
            )
            .await;
            if let Err(e) = result {
                error!("Bluetooth scan failed: {}", e);
            }
            if finish_scan(&slot, &cancel_token, &scanning) {
                info!("Bluetooth scan stopped");
            } else {
                debug!("Scan task ended after a newer scan started");
            }
        });
    }

    fn stop(&self) {
        match lock(&self.cancel_token).take() {
            Some(token) => {
                info!("Stopping Bluetooth scan.");
                token.cancel();
            }
            None => debug!("No active scan to stop"),
        }
    }

    fn is_scanning(&self) -> BoxStream<'static, bool> {
        watch_stream(self.scanning.subscribe())
    }
}

impl PeripheralDiscoverer for BluetoothScanner {
    fn discovered(&self) -> BoxStream<'static, DiscoveredPeripheral> {
        broadcast_stream(self.discovered.subscribe())
    }
}
