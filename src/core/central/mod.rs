//! Central-role state machines, from the adapter down to characteristics.

pub mod adapter;
pub mod authorization;
pub mod characteristic;
pub mod connection;
pub mod discover;
pub mod peripheral;
pub mod property_discover;
pub mod providers;
pub mod scan;
pub mod service;
pub mod types;

pub use adapter::{AdapterState, CentralAction, PowerEvent};
pub use discover::{DiscoverAction, DiscoverState};
pub use peripheral::{PeripheralAction, PeripheralRecord};
pub use types::{PeripheralId, ServiceId};
