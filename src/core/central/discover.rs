//! Discovery phase: scanning, the peripheral registry and selection.

use std::collections::BTreeMap;

use log::{debug, info};
use serde::Serialize;

use crate::core::central::connection::{ConnectionAction, ConnectionState};
use crate::core::central::peripheral::{PeripheralAction, PeripheralRecord};
use crate::core::central::scan::{ScanAction, ScanState};
use crate::core::central::types::{DiscoveredPeripheral, PeripheralId};
use crate::core::effect::{CancelKey, Effects, Event, Purpose, Source, Subscription};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoverState {
    pub scan: ScanState,
    peripherals: BTreeMap<PeripheralId, PeripheralRecord>,
    selected: Option<PeripheralId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoverAction {
    Setup,
    Scan(ScanAction),
    Peripheral { id: PeripheralId, action: PeripheralAction },
    /// One batch of advertisements.
    Discovered(Vec<DiscoveredPeripheral>),
    Select(Option<PeripheralId>),
    /// Forwarded to the selected peripheral, dropped when none is selected.
    SelectedPeripheral(PeripheralAction),
}

impl DiscoverState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peripherals(&self) -> impl Iterator<Item = &PeripheralRecord> {
        self.peripherals.values()
    }

    pub fn peripheral(&self, id: &PeripheralId) -> Option<&PeripheralRecord> {
        self.peripherals.get(id)
    }

    pub fn selected_id(&self) -> Option<&PeripheralId> {
        self.selected.as_ref()
    }

    pub fn selected_peripheral(&self) -> Option<&PeripheralRecord> {
        self.selected.as_ref().and_then(|id| self.peripherals.get(id))
    }

    pub fn reduce(&mut self, action: DiscoverAction) -> Effects<DiscoverAction> {
        match action {
            DiscoverAction::Setup => Effects::send(DiscoverAction::Scan(ScanAction::Setup)),
            DiscoverAction::Scan(action) => {
                let started = matches!(action, ScanAction::Started);
                let mut effects = self.scan.reduce(action).map(DiscoverAction::Scan);
                if started {
                    effects.extend(Effects::subscribe(
                        CancelKey::central(Purpose::Discovery),
                        vec![Subscription::new(Source::Discovered, |event| match event {
                            Event::Discovered(batch) => Some(DiscoverAction::Discovered(batch)),
                            _ => None,
                        })],
                    ));
                }
                effects
            }
            DiscoverAction::Discovered(batch) => {
                for advertisement in batch {
                    match self.peripherals.get_mut(&advertisement.id) {
                        Some(existing) => existing.rssi = advertisement.rssi,
                        None => {
                            debug!("Discovered peripheral {} ({:?})", advertisement.id, advertisement.name);
                            let record = PeripheralRecord::new(
                                advertisement.id.clone(),
                                advertisement.name,
                                advertisement.rssi,
                            );
                            self.peripherals.insert(advertisement.id, record);
                        }
                    }
                }
                Effects::none()
            }
            DiscoverAction::Peripheral { id, action } => {
                let connect = matches!(action, PeripheralAction::Connection(ConnectionAction::Connect));
                let Some(peripheral) = self.peripherals.get_mut(&id) else {
                    debug!("Dropping action for unknown peripheral {}", id);
                    return Effects::none();
                };
                let lifted = id.clone();
                let mut effects = peripheral
                    .reduce(action)
                    .map(move |action| DiscoverAction::Peripheral { id: lifted.clone(), action });
                if connect {
                    effects.extend(Effects::send(DiscoverAction::Select(Some(id))));
                }
                effects
            }
            DiscoverAction::Select(id) => self.select(id),
            DiscoverAction::SelectedPeripheral(action) => match &self.selected {
                Some(id) => Effects::send(DiscoverAction::Peripheral { id: id.clone(), action }),
                None => Effects::none(),
            },
        }
    }

    fn select(&mut self, id: Option<PeripheralId>) -> Effects<DiscoverAction> {
        if self.selected == id {
            return Effects::none();
        }
        if let Some(id) = &id {
            if !self.peripherals.contains_key(id) {
                debug!("Cannot select unknown peripheral {}", id);
                return Effects::none();
            }
        }

        let mut effects = Effects::none();
        if let Some(previous) = self.selected.take() {
            if let Some(record) = self.peripherals.get_mut(&previous) {
                info!("Releasing peripheral {}", previous);
                let lifted = previous.clone();
                effects.extend(
                    record
                        .release()
                        .map(move |action| DiscoverAction::Peripheral { id: lifted.clone(), action }),
                );
            }
        }

        self.selected = id.clone();
        if let Some(id) = id {
            info!("Selected peripheral {}", id);
            effects.extend(Effects::send(DiscoverAction::Scan(ScanAction::Stop)));
            let already_connecting = self
                .peripherals
                .get(&id)
                .is_some_and(|record| record.connection != ConnectionState::Disconnected);
            if !already_connecting {
                effects.extend(Effects::send(DiscoverAction::Peripheral {
                    id,
                    action: PeripheralAction::Connection(ConnectionAction::Connect),
                }));
            }
        }
        effects
    }

    /// Cancels every subscription group owned by the discovery phase. Used
    /// when the adapter leaves it.
    pub fn teardown(&self) -> Effects<DiscoverAction> {
        let mut effects = Effects::cancel(CancelKey::central(Purpose::Scanning));
        effects.extend(Effects::cancel(CancelKey::central(Purpose::Discovery)));
        for id in self.peripherals.keys() {
            for purpose in [
                Purpose::Activation,
                Purpose::Connection,
                Purpose::DataInput,
                Purpose::DataOutput,
            ] {
                effects.extend(Effects::cancel(CancelKey::peripheral(id, purpose)));
            }
        }
        effects
    }
}
