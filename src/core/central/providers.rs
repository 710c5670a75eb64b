//! Interfaces to the platform BLE stack. The reducers never see these; the
//! store opens their streams and invokes their calls on the reducers' behalf.

use std::time::Duration;

use futures_util::stream::BoxStream;

use crate::core::central::adapter::PowerEvent;
use crate::core::central::authorization::AuthorizationState;
use crate::core::central::types::{
    DiscoveredCharacteristic, DiscoveredPeripheral, DiscoveredService, PeripheralId, RelayTarget,
    ServiceKey,
};

pub trait RadioStateProvider: Send + Sync {
    /// Current state first, then every change.
    fn power_events(&self) -> BoxStream<'static, PowerEvent>;
}

pub trait AuthorizationProvider: Send + Sync {
    fn authorization(&self) -> BoxStream<'static, AuthorizationState>;
}

pub trait Scanner: Send + Sync {
    fn start(&self);
    fn stop(&self);
    /// Current scanning flag first, then every change.
    fn is_scanning(&self) -> BoxStream<'static, bool>;
}

pub trait PeripheralDiscoverer: Send + Sync {
    /// One item per advertisement; batching happens in the store.
    fn discovered(&self) -> BoxStream<'static, DiscoveredPeripheral>;
}

pub trait PeripheralManager: Send + Sync {
    fn connect(&self, id: &PeripheralId);
    fn disconnect(&self, id: &PeripheralId);
    fn connection_state(&self, id: &PeripheralId) -> BoxStream<'static, bool>;
    /// Signal strength polled every `interval`, deduplicated.
    fn rssi(&self, id: &PeripheralId, interval: Duration) -> BoxStream<'static, i16>;
}

/// Each stream yields a single result and ends. Failures yield an empty list.
pub trait ServiceDiscoverer: Send + Sync {
    fn services(&self, id: &PeripheralId) -> BoxStream<'static, Vec<DiscoveredService>>;
    fn included_services(&self, key: &ServiceKey) -> BoxStream<'static, Vec<DiscoveredService>>;
    fn characteristics(&self, key: &ServiceKey) -> BoxStream<'static, Vec<DiscoveredCharacteristic>>;
}

/// Moves bytes between the bridge and the RX/TX characteristics.
pub trait RelayClient: Send + Sync {
    /// Enables notifications on RX; yields once when the relay is ready.
    fn start(&self, target: &RelayTarget) -> BoxStream<'static, ()>;
    fn stop(&self);
    /// Unacknowledged write to TX. Dropped when no relay is running.
    fn write(&self, data: Vec<u8>);
    /// Notification payloads from RX.
    fn output(&self) -> BoxStream<'static, Vec<u8>>;
}
