//! Connection handling and RSSI polling for discovered peripherals.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use bluest::{Adapter, ConnectionEvent, Device};
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::constants::CONNECTION_EVENTS_CAPACITY;
use crate::core::bluetooth::handles::{HandleTable, Handles};
use crate::core::bluetooth::lane::BleLane;
use crate::core::central::providers::PeripheralManager;
use crate::core::central::types::PeripheralId;
use crate::core::streams::broadcast_stream;
use crate::utils::lock;

pub struct ConnectionManager {
    adapter: Adapter,
    lane: BleLane,
    handles: Handles,
    states: Mutex<HashMap<PeripheralId, broadcast::Sender<bool>>>,
    /// Tasks connecting to or watching a peripheral.
    links: HandleTable<PeripheralId, CancellationToken>,
}

impl ConnectionManager {
    pub fn new(adapter: Adapter, lane: BleLane, handles: Handles) -> Self {
        Self {
            adapter,
            lane,
            handles,
            states: Mutex::new(HashMap::new()),
            links: HandleTable::default(),
        }
    }

    fn state_sender(&self, id: &PeripheralId) -> broadcast::Sender<bool> {
        lock(&self.states)
            .entry(id.clone())
            .or_insert_with(|| broadcast::channel(CONNECTION_EVENTS_CAPACITY).0)
            .clone()
    }

    /// Connects, then follows platform connection events until the link
    /// drops or the token is cancelled.
    async fn connect_and_watch(
        adapter: Adapter,
        device: Device,
        id: PeripheralId,
        states: broadcast::Sender<bool>,
        cancel_token: CancellationToken,
    ) {
        if device.is_connected().await {
            info!("Device {} already connected.", id);
        } else {
            info!("Initiating connection to {}...", id);
            let connected = tokio::select! {
                _ = cancel_token.cancelled() => return,
                result = adapter.connect_device(&device) => result,
            };
            if let Err(e) = connected {
                warn!("Connection to {} failed: {}", id, e);
                let _ = states.send(false);
                return;
            }
        }
        info!("Connected to {}", id);
        let _ = states.send(true);

        let mut events = match adapter.device_connection_events(&device).await {
            Ok(events) => events,
            Err(e) => {
                debug!("Cannot follow connection events of {}: {}", id, e);
                return;
            }
        };
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                event = events.next() => match event {
                    Some(ConnectionEvent::Disconnected) => {
                        info!("Device {} disconnected", id);
                        let _ = states.send(false);
                        break;
                    }
                    Some(ConnectionEvent::Connected) => {}
                    None => break,
                },
            }
        }
    }
}

impl PeripheralManager for ConnectionManager {
    fn connect(&self, id: &PeripheralId) {
        let states = self.state_sender(id);
        let Some(device) = self.handles.devices.get(id) else {
            warn!("Device not found with ID: {}", id);
            let _ = states.send(false);
            return;
        };
        let cancel_token = CancellationToken::new();
        if let Some(previous) = self.links.insert(id.clone(), cancel_token.clone()) {
            previous.cancel();
        }
        // Connecting can take arbitrarily long, so it stays off the lane.
        tokio::spawn(Self::connect_and_watch(
            self.adapter.clone(),
            device,
            id.clone(),
            states,
            cancel_token,
        ));
    }

    fn disconnect(&self, id: &PeripheralId) {
        if let Some(link) = self.links.remove(id) {
            link.cancel();
        }
        let states = self.state_sender(id);
        let Some(device) = self.handles.devices.get(id) else {
            let _ = states.send(false);
            return;
        };
        let adapter = self.adapter.clone();
        let id = id.clone();
        self.lane.dispatch(async move {
            if device.is_connected().await {
                info!("Disconnecting from device {}", id);
                if let Err(e) = adapter.disconnect_device(&device).await {
                    warn!("Failed to disconnect {}: {}", id, e);
                }
            } else {
                info!("Device {} not connected", id);
            }
            let _ = states.send(false);
        });
    }

    fn connection_state(&self, id: &PeripheralId) -> BoxStream<'static, bool> {
        broadcast_stream(self.state_sender(id).subscribe())
    }

    fn rssi(&self, id: &PeripheralId, interval: Duration) -> BoxStream<'static, i16> {
        let Some(device) = self.handles.devices.get(id) else {
            return stream::empty().boxed();
        };
        let lane = self.lane.clone();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        stream::unfold((ticker, None::<i16>), move |(mut ticker, last)| {
            let device = device.clone();
            let lane = lane.clone();
            async move {
                loop {
                    ticker.tick().await;
                    let polled = device.clone();
                    match lane.run(async move { polled.rssi().await }).await? {
                        Ok(rssi) if Some(rssi) != last => return Some((rssi, (ticker, Some(rssi)))),
                        Ok(_) => {}
                        Err(e) => debug!("RSSI read failed for {:?}: {}", device.id(), e),
                    }
                }
            }
        })
        .boxed()
    }
}
