//! Service records: characteristic discovery and RX/TX role bookkeeping.

use std::collections::BTreeMap;

use log::{debug, info};
use serde::Serialize;

use crate::core::central::characteristic::{CharacteristicAction, CharacteristicRecord, Usage};
use crate::core::central::property_discover::{Discovery, DiscoveryAction, DiscoveryOutcome};
use crate::core::central::types::{
    CharacteristicId, DiscoveredCharacteristic, DiscoveredService, PeripheralId, ServiceId,
    ServiceKey,
};
use crate::core::effect::{CancelKey, Effects, Event, Purpose, Source, Subscription};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceRecord {
    pub id: ServiceId,
    pub name: String,
    characteristics: BTreeMap<CharacteristicId, CharacteristicRecord>,
    characteristic_discovery: Discovery<Vec<DiscoveredCharacteristic>>,
    included_discovery: Discovery<Vec<DiscoveredService>>,
    rx: Option<CharacteristicId>,
    tx: Option<CharacteristicId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceAction {
    Characteristic { id: CharacteristicId, action: CharacteristicAction },
    CharacteristicDiscovery(DiscoveryAction<Vec<DiscoveredCharacteristic>>),
    IncludedServiceDiscovery(DiscoveryAction<Vec<DiscoveredService>>),
    Activate,
    CheckPublish,
    /// Handled by the owning peripheral, which starts the relay.
    Publish,
}

impl ServiceRecord {
    pub fn new(discovered: &DiscoveredService) -> Self {
        Self {
            id: discovered.id,
            name: discovered.name.clone(),
            characteristics: BTreeMap::new(),
            characteristic_discovery: Discovery::default(),
            included_discovery: Discovery::default(),
            rx: None,
            tx: None,
        }
    }

    pub fn characteristics(&self) -> impl Iterator<Item = &CharacteristicRecord> {
        self.characteristics.values()
    }

    pub fn characteristic(&self, id: &CharacteristicId) -> Option<&CharacteristicRecord> {
        self.characteristics.get(id)
    }

    pub fn included_services(&self) -> &[DiscoveredService] {
        self.included_discovery.last_result().map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_discovering_characteristics(&self) -> bool {
        self.characteristic_discovery.is_discovering()
    }

    /// Characteristic assigned the notify role.
    pub fn rx(&self) -> Option<CharacteristicId> {
        self.rx
    }

    /// Characteristic assigned the write-without-response role.
    pub fn tx(&self) -> Option<CharacteristicId> {
        self.tx
    }

    pub fn can_publish(&self) -> bool {
        self.rx.is_some() && self.tx.is_some()
    }

    pub fn reduce(&mut self, peripheral: &PeripheralId, action: ServiceAction) -> Effects<ServiceAction> {
        let key = ServiceKey::new(peripheral.clone(), self.id);
        match action {
            ServiceAction::Characteristic { id, action: CharacteristicAction::Use(usage) } => {
                let Some(characteristic) = self.characteristics.get_mut(&id) else {
                    debug!("Unknown characteristic {} in service {}", id, self.id);
                    return Effects::none();
                };
                if !characteristic.reduce(CharacteristicAction::Use(usage)) {
                    debug!("Characteristic {} cannot be used for {:?}", id, usage);
                    return Effects::none();
                }
                if let Some(usage) = usage {
                    for (other_id, other) in self.characteristics.iter_mut() {
                        if *other_id != id && other.usage() == Some(usage) {
                            other.clear_usage();
                        }
                    }
                }
                self.check_publish();
                Effects::send(ServiceAction::CheckPublish)
            }
            ServiceAction::CharacteristicDiscovery(action) => {
                if let DiscoveryAction::Discovered(discovered) = &action {
                    self.characteristics = discovered
                        .iter()
                        .map(|characteristic| (characteristic.id, CharacteristicRecord::new(characteristic)))
                        .collect();
                }
                match self.characteristic_discovery.reduce(action) {
                    DiscoveryOutcome::Started => Effects::subscribe(
                        CancelKey::service(&key, Purpose::CharacteristicDiscovery),
                        vec![Subscription::new(Source::Characteristics(key), |event| match event {
                            Event::Characteristics(found) => Some(ServiceAction::CharacteristicDiscovery(
                                DiscoveryAction::Discovered(found),
                            )),
                            _ => None,
                        })],
                    ),
                    DiscoveryOutcome::Completed => {
                        info!(
                            "Service {} has {} characteristics",
                            self.id,
                            self.characteristics.len()
                        );
                        self.check_publish();
                        Effects::send(ServiceAction::CheckPublish)
                    }
                    DiscoveryOutcome::AlreadyDiscovering => Effects::none(),
                }
            }
            ServiceAction::IncludedServiceDiscovery(action) => {
                match self.included_discovery.reduce(action) {
                    DiscoveryOutcome::Started => Effects::subscribe(
                        CancelKey::service(&key, Purpose::IncludedServiceDiscovery),
                        vec![Subscription::new(Source::IncludedServices(key), |event| match event {
                            Event::Services(found) => Some(ServiceAction::IncludedServiceDiscovery(
                                DiscoveryAction::Discovered(found),
                            )),
                            _ => None,
                        })],
                    ),
                    _ => Effects::none(),
                }
            }
            ServiceAction::Activate => {
                let mut effects = Effects::send(ServiceAction::IncludedServiceDiscovery(DiscoveryAction::Discover));
                effects.extend(Effects::send(ServiceAction::CharacteristicDiscovery(
                    DiscoveryAction::Discover,
                )));
                effects
            }
            ServiceAction::CheckPublish => {
                self.check_publish();
                Effects::none()
            }
            ServiceAction::Publish => Effects::none(),
        }
    }

    fn check_publish(&mut self) {
        self.rx = None;
        self.tx = None;
        for characteristic in self.characteristics.values() {
            match characteristic.usage() {
                Some(Usage::Notify) => self.rx = Some(characteristic.id),
                Some(Usage::WriteWithoutResponse) => self.tx = Some(characteristic.id),
                _ => {}
            }
        }
    }
}
