//! Live Bluetooth bindings for the bridge.
//! Implements the central providers on top of `bluest`: radio state,
//! scanning, connections, GATT discovery and the notify/write relay.

mod adapter;
mod connection;
mod constants;
mod discovery;
mod handles;
mod lane;
mod manager;
mod notification;
mod scanner;

pub use adapter::{LiveAuthorization, LiveRadio};
pub use connection::ConnectionManager;
pub use constants::*;
pub use discovery::ServiceDiscovery;
pub use handles::{HandleTable, Handles};
pub use lane::BleLane;
pub use manager::BluetoothManager;
pub use notification::NotificationHandler;
pub use scanner::BluetoothScanner;
