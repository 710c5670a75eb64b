//! Lookup tables from bridge identifiers to live `bluest` handles.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use bluest::{Characteristic, Device, Service};

use crate::core::central::types::{CharacteristicId, PeripheralId, ServiceKey};
use crate::utils::lock;

/// Mutex-guarded map. Writes to an existing key replace the handle.
pub struct HandleTable<K, V> {
    entries: Arc<Mutex<HashMap<K, V>>>,
}

impl<K, V> Clone for HandleTable<K, V> {
    fn clone(&self) -> Self {
        Self { entries: self.entries.clone() }
    }
}

impl<K, V> Default for HandleTable<K, V> {
    fn default() -> Self {
        Self { entries: Arc::new(Mutex::new(HashMap::new())) }
    }
}

impl<K: Eq + Hash, V: Clone> HandleTable<K, V> {
    /// Returns the handle previously stored under `key`.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        lock(&self.entries).insert(key, value)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        lock(&self.entries).get(key).cloned()
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        lock(&self.entries).remove(key)
    }

    /// Removes every entry matching `predicate`.
    pub fn remove_where(&self, predicate: impl Fn(&K) -> bool) {
        lock(&self.entries).retain(|key, _| !predicate(key));
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

/// Characteristic handles are keyed by their service and their own UUID.
pub type CharacteristicKey = (ServiceKey, CharacteristicId);

/// Every handle table the live bindings share.
#[derive(Clone, Default)]
pub struct Handles {
    pub devices: HandleTable<PeripheralId, Device>,
    pub services: HandleTable<ServiceKey, Service>,
    pub characteristics: HandleTable<CharacteristicKey, Characteristic>,
}

impl Handles {
    /// Drops the service and characteristic handles of a peripheral; called
    /// before its services are rediscovered.
    pub fn clear_services(&self, peripheral: &PeripheralId) {
        self.services.remove_where(|key| &key.peripheral == peripheral);
        self.characteristics.remove_where(|(key, _)| &key.peripheral == peripheral);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_write_wins() {
        let table: HandleTable<&str, u8> = HandleTable::default();
        assert_eq!(table.insert("a", 1), None);
        assert_eq!(table.insert("a", 2), Some(1));
        assert_eq!(table.get(&"a"), Some(2));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn clones_share_entries() {
        let table: HandleTable<u8, u8> = HandleTable::default();
        let other = table.clone();
        other.insert(1, 10);
        assert_eq!(table.get(&1), Some(10));
        assert_eq!(table.remove(&1), Some(10));
        assert!(other.is_empty());
    }

    #[test]
    fn remove_where_filters_keys() {
        let table: HandleTable<(u8, u8), ()> = HandleTable::default();
        table.insert((1, 1), ());
        table.insert((1, 2), ());
        table.insert((2, 1), ());
        table.remove_where(|(group, _)| *group == 1);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&(2, 1)), Some(()));
    }
}
