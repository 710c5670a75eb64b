//! Radio state and authorization from the host adapter.

use std::time::Duration;

use bluest::{Adapter, AdapterEvent};
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use log::{error, info, warn};
use tokio::sync::mpsc;

use crate::core::central::adapter::PowerEvent;
use crate::core::central::authorization::AuthorizationState;
use crate::core::central::providers::{AuthorizationProvider, RadioStateProvider};
use crate::core::streams::receiver_stream;

pub struct LiveRadio {
    adapter: Adapter,
    availability_timeout: Duration,
}

impl LiveRadio {
    pub fn new(adapter: Adapter, availability_timeout: Duration) -> Self {
        Self { adapter, availability_timeout }
    }

    async fn follow(
        adapter: Adapter,
        availability_timeout: Duration,
        events: mpsc::UnboundedSender<PowerEvent>,
    ) -> anyhow::Result<()> {
        let initial = match tokio::time::timeout(availability_timeout, adapter.wait_available()).await {
            Ok(Ok(())) => PowerEvent::PoweredOn,
            Ok(Err(e)) => {
                warn!("Bluetooth adapter unavailable: {}", e);
                PowerEvent::PoweredOff
            }
            Err(_) => PowerEvent::PoweredOff,
        };
        info!("Initial Bluetooth state: {:?}", initial);
        if events.send(initial).is_err() {
            return Ok(());
        }

        let mut changes = adapter.events().await?;
        while let Some(change) = changes.next().await {
            let power = match change {
                Ok(AdapterEvent::Available) => PowerEvent::PoweredOn,
                Ok(AdapterEvent::Unavailable) => PowerEvent::PoweredOff,
                Err(e) => {
                    warn!("Adapter event error: {}", e);
                    continue;
                }
            };
            if events.send(power).is_err() {
                break;
            }
        }
        Ok(())
    }
}

impl RadioStateProvider for LiveRadio {
    fn power_events(&self) -> BoxStream<'static, PowerEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let adapter = self.adapter.clone();
        let timeout = self.availability_timeout;
        tokio::spawn(async move {
            if let Err(e) = Self::follow(adapter, timeout, sender).await {
                error!("Failed to follow adapter state: {}", e);
            }
        });
        receiver_stream(receiver)
    }
}

/// Hosts reachable through `bluest` grant Bluetooth access at the OS level,
/// so authorization is reported as granted once.
pub struct LiveAuthorization;

impl AuthorizationProvider for LiveAuthorization {
    fn authorization(&self) -> BoxStream<'static, AuthorizationState> {
        stream::iter([AuthorizationState::AllowedAlways]).boxed()
    }
}
