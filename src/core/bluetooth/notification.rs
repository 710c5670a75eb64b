//! Relay between the bridge and the RX/TX characteristics.
//! RX notifications are forwarded to an output broadcast; writes go to TX
//! without response through the BLE lane.

use std::sync::Mutex;

use bluest::Characteristic;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::constants::RELAY_OUTPUT_CAPACITY;
use crate::core::bluetooth::handles::Handles;
use crate::core::bluetooth::lane::BleLane;
use crate::core::central::providers::RelayClient;
use crate::core::central::types::{RelayTarget, ServiceKey};
use crate::core::streams::broadcast_stream;
use crate::utils::lock;

struct ActiveRelay {
    cancel_token: CancellationToken,
    write_char: Characteristic,
}

pub struct NotificationHandler {
    lane: BleLane,
    handles: Handles,
    output: broadcast::Sender<Vec<u8>>,
    active: Mutex<Option<ActiveRelay>>,
}

impl NotificationHandler {
    pub fn new(lane: BleLane, handles: Handles) -> Self {
        let (output, _) = broadcast::channel(RELAY_OUTPUT_CAPACITY);
        Self { lane, handles, output, active: Mutex::new(None) }
    }

    /// Forwards notifications until cancelled; acknowledges once subscribed.
    async fn process_notifications(
        notify_char: Characteristic,
        output: broadcast::Sender<Vec<u8>>,
        cancel_token: CancellationToken,
        ready: oneshot::Sender<()>,
    ) {
        info!("Subscribing to notifications on {}...", notify_char.uuid());
        let mut notification_stream = match notify_char.notify().await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to subscribe to notifications: {}", e);
                return;
            }
        };
        let _ = ready.send(());

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                result = notification_stream.next() => match result {
                    Some(Ok(value)) => {
                        debug!("Received {} bytes", value.len());
                        // Dropped when nobody listens.
                        let _ = output.send(value);
                    }
                    Some(Err(e)) => {
                        error!("Error in notification stream: {}", e);
                        break;
                    }
                    None => break,
                },
            }
        }
        info!("Notification stream ended");
    }
}

impl RelayClient for NotificationHandler {
    fn start(&self, target: &RelayTarget) -> BoxStream<'static, ()> {
        let key = ServiceKey::new(target.peripheral.clone(), target.service);
        let notify_char = self.handles.characteristics.get(&(key.clone(), target.rx));
        let write_char = self.handles.characteristics.get(&(key, target.tx));
        let (Some(notify_char), Some(write_char)) = (notify_char, write_char) else {
            warn!("Relay characteristics not found for service {}", target.service);
            return stream::empty().boxed();
        };

        let cancel_token = CancellationToken::new();
        let previous = lock(&self.active).replace(ActiveRelay { cancel_token: cancel_token.clone(), write_char });
        if let Some(previous) = previous {
            previous.cancel_token.cancel();
        }

        let (ready, acknowledged) = oneshot::channel();
        tokio::spawn(Self::process_notifications(notify_char, self.output.clone(), cancel_token, ready));
        stream::once(acknowledged).filter_map(|ack| async move { ack.ok() }).boxed()
    }

    fn stop(&self) {
        if let Some(active) = lock(&self.active).take() {
            info!("Stopping data relay");
            active.cancel_token.cancel();
        }
    }

    fn write(&self, data: Vec<u8>) {
        let write_char = lock(&self.active).as_ref().map(|active| active.write_char.clone());
        let Some(write_char) = write_char else {
            debug!("No relay running, dropping {} bytes", data.len());
            return;
        };
        self.lane.dispatch(async move {
            if let Err(e) = write_char.write_without_response(&data).await {
                warn!("Write to {} failed: {}", write_char.uuid(), e);
            }
        });
    }

    fn output(&self) -> BoxStream<'static, Vec<u8>> {
        broadcast_stream(self.output.subscribe())
    }
}
