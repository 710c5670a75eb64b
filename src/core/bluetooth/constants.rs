//! Constants used by the live Bluetooth bindings: well-known GATT UUIDs and
//! their display names.

use uuid::Uuid;

/// Reported when an advertisement carries no signal strength.
pub const RSSI_UNAVAILABLE: i16 = 127;

/// Capacity of the per-peripheral connection-state broadcast.
pub const CONNECTION_EVENTS_CAPACITY: usize = 16;

/// Capacity of the discovered-peripheral broadcast.
pub const DISCOVERY_EVENTS_CAPACITY: usize = 256;

/// Capacity of the relay output broadcast.
pub const RELAY_OUTPUT_CAPACITY: usize = 1024;

/// Standard Bluetooth Service UUIDs
pub const UUID_GENERIC_ACCESS_SERVICE: Uuid = Uuid::from_u128(0x00001800_0000_1000_8000_00805f9b34fb);
pub const UUID_GENERIC_ATTRIBUTE_SERVICE: Uuid = Uuid::from_u128(0x00001801_0000_1000_8000_00805f9b34fb);
pub const UUID_DEVICE_INFORMATION_SERVICE: Uuid = Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);
pub const UUID_BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);

/// Standard Bluetooth Characteristic UUIDs
pub const UUID_DEVICE_NAME: Uuid = Uuid::from_u128(0x00002a00_0000_1000_8000_00805f9b34fb);
pub const UUID_MANUFACTURER_NAME: Uuid = Uuid::from_u128(0x00002a29_0000_1000_8000_00805f9b34fb);
pub const UUID_MODEL_NUMBER: Uuid = Uuid::from_u128(0x00002a24_0000_1000_8000_00805f9b34fb);
pub const UUID_BATTERY_LEVEL: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

/// Nordic UART service, the most common serial-over-BLE layout
pub const UUID_NORDIC_UART_SERVICE: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);
pub const UUID_NORDIC_UART_RX: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);
pub const UUID_NORDIC_UART_TX: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

const KNOWN_NAMES: [(Uuid, &str); 11] = [
    (UUID_GENERIC_ACCESS_SERVICE, "Generic Access"),
    (UUID_GENERIC_ATTRIBUTE_SERVICE, "Generic Attribute"),
    (UUID_DEVICE_INFORMATION_SERVICE, "Device Information"),
    (UUID_BATTERY_SERVICE, "Battery"),
    (UUID_DEVICE_NAME, "Device Name"),
    (UUID_MANUFACTURER_NAME, "Manufacturer Name String"),
    (UUID_MODEL_NUMBER, "Model Number String"),
    (UUID_BATTERY_LEVEL, "Battery Level"),
    (UUID_NORDIC_UART_SERVICE, "Nordic UART"),
    (UUID_NORDIC_UART_RX, "UART RX"),
    (UUID_NORDIC_UART_TX, "UART TX"),
];

/// Human-readable name of a GATT attribute, or its UUID when unknown.
pub fn describe_uuid(uuid: &Uuid) -> String {
    KNOWN_NAMES
        .iter()
        .find(|(known, _)| known == uuid)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| uuid.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_names() {
        assert_eq!(describe_uuid(&UUID_BATTERY_SERVICE), "Battery");
        let unknown = Uuid::from_u128(7);
        assert_eq!(describe_uuid(&unknown), unknown.to_string());
    }
}
