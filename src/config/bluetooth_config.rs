use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::store::Timing;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Interval between RSSI reads of a connected peripheral.
    pub rssi_interval_ms: u64,

    /// Window over which discovered peripherals are collected into one update.
    pub discovery_batch_ms: u64,

    /// How long to wait for the adapter to report its first availability.
    pub availability_timeout_ms: u64,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        BluetoothConfig { rssi_interval_ms: 1000, discovery_batch_ms: 500, availability_timeout_ms: 2000 }
    }
}

impl BluetoothConfig {
    pub fn timing(&self) -> Timing {
        Timing {
            discovery_window: Duration::from_millis(self.discovery_batch_ms.max(1)),
            rssi_interval: Duration::from_millis(self.rssi_interval_ms.max(1)),
        }
    }

    pub fn availability_timeout(&self) -> Duration {
        Duration::from_millis(self.availability_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_store_timing() {
        assert_eq!(BluetoothConfig::default().timing(), Timing::default());
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let config = BluetoothConfig { rssi_interval_ms: 0, discovery_batch_ms: 0, ..Default::default() };
        let timing = config.timing();
        assert!(!timing.rssi_interval.is_zero());
        assert!(!timing.discovery_window.is_zero());
    }
}
