//! Core functionality for the BLE bridge.
//! State machines and reducers live in `central`, `publish` and `bridge`;
//! `store` runs them against the live bindings in `bluetooth` and `network`.

pub mod bluetooth;
pub mod bridge;
pub mod central;
pub mod effect;
pub mod network;
pub mod publish;
pub mod store;
pub mod streams;

// Re-export commonly used types
pub use bluetooth::BluetoothManager;
pub use bridge::{BridgeAction, BridgeState};
pub use network::NetworkServer;
pub use store::{BridgeHandle, Providers, Timing};
