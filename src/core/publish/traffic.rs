//! Byte counters for each relay direction.

use serde::Serialize;

use crate::core::publish::server::ServerAction;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrafficCounters {
    pub ble_to_bridge: u64,
    pub bridge_to_ble: u64,
}

impl TrafficCounters {
    pub fn record(&mut self, action: &ServerAction) {
        match action {
            ServerAction::Start => *self = Self::default(),
            ServerAction::BleToBridge(data) => self.ble_to_bridge += data.len() as u64,
            ServerAction::BridgeToBle(data) => self.bridge_to_ble += data.len() as u64,
            _ => {}
        }
    }
}

/// Formats a byte count with the largest fitting binary unit, e.g. `1.5 KB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
