//! Defines shared identifiers and discovery descriptors for the central side.

use std::fmt;
use std::ops::BitOr;

use serde::Serialize;
use uuid::Uuid;

/// Platform-specific unique identifier of a peripheral.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PeripheralId(String);

impl PeripheralId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeripheralId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

pub type ServiceId = Uuid;
pub type CharacteristicId = Uuid;

/// Addresses a service of a given peripheral. Service UUIDs repeat across
/// devices, so the peripheral is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ServiceKey {
    pub peripheral: PeripheralId,
    pub service: ServiceId,
}

impl ServiceKey {
    pub fn new(peripheral: PeripheralId, service: ServiceId) -> Self {
        Self { peripheral, service }
    }
}

/// The characteristics a relay session binds together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RelayTarget {
    pub peripheral: PeripheralId,
    pub service: ServiceId,
    /// Notify characteristic, device to bridge.
    pub rx: CharacteristicId,
    /// Write-without-response characteristic, bridge to device.
    pub tx: CharacteristicId,
}

/// A single advertisement as reported by the peripheral discoverer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredPeripheral {
    pub id: PeripheralId,
    pub name: Option<String>,
    pub rssi: i16,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DiscoveredService {
    pub id: ServiceId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DiscoveredCharacteristic {
    pub id: CharacteristicId,
    pub name: String,
    pub properties: CharacteristicProperties,
}

/// Bitset of GATT characteristic properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct CharacteristicProperties(u16);

impl CharacteristicProperties {
    pub const BROADCAST: Self = Self(1 << 0);
    pub const READ: Self = Self(1 << 1);
    pub const WRITE_WITHOUT_RESPONSE: Self = Self(1 << 2);
    pub const WRITE: Self = Self(1 << 3);
    pub const NOTIFY: Self = Self(1 << 4);
    pub const INDICATE: Self = Self(1 << 5);
    pub const AUTHENTICATED_SIGNED_WRITES: Self = Self(1 << 6);
    pub const EXTENDED_PROPERTIES: Self = Self(1 << 7);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn set(&mut self, other: Self, enabled: bool) {
        if enabled {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }
}

impl BitOr for CharacteristicProperties {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_contains_only_set_flags() {
        let props = CharacteristicProperties::NOTIFY | CharacteristicProperties::READ;
        assert!(props.contains(CharacteristicProperties::NOTIFY));
        assert!(props.contains(CharacteristicProperties::READ));
        assert!(!props.contains(CharacteristicProperties::WRITE_WITHOUT_RESPONSE));
        assert!(props.contains(CharacteristicProperties::empty()));
    }

    #[test]
    fn properties_set_clears_flag() {
        let mut props = CharacteristicProperties::empty();
        props.set(CharacteristicProperties::WRITE, true);
        assert!(props.contains(CharacteristicProperties::WRITE));
        props.set(CharacteristicProperties::WRITE, false);
        assert_eq!(props, CharacteristicProperties::empty());
    }
}
