//! Peripheral records: connection, RSSI, service discovery and the relay
//! subscriptions of a publish session.

use std::collections::BTreeMap;

use log::{debug, info};
use serde::Serialize;

use crate::core::central::connection::{ConnectionAction, ConnectionState};
use crate::core::central::property_discover::{Discovery, DiscoveryAction};
use crate::core::central::service::{ServiceAction, ServiceRecord};
use crate::core::central::types::{DiscoveredService, PeripheralId, RelayTarget, ServiceId};
use crate::core::effect::{Call, CancelKey, Effects, Event, Purpose, Source, Subscription};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeripheralRecord {
    pub id: PeripheralId,
    pub name: Option<String>,
    pub rssi: i16,
    pub connection: ConnectionState,
    service_discovery: Discovery<Vec<DiscoveredService>>,
    services: BTreeMap<ServiceId, ServiceRecord>,
    selected: Option<ServiceId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralAction {
    Activate,
    UpdateRssi(i16),
    Connection(ConnectionAction),
    ServiceDiscovery(DiscoveryAction<Vec<DiscoveredService>>),
    Service { id: ServiceId, action: ServiceAction },
    SelectedService(ServiceAction),
    SelectService(Option<ServiceId>),
    StopDataExchange,
    /// Payload notified by the RX characteristic.
    DidRead(Vec<u8>),
    /// Payload to write to the TX characteristic.
    Write(Vec<u8>),
    /// Relay acknowledged its start.
    DidWrite,
}

impl PeripheralRecord {
    pub fn new(id: PeripheralId, name: Option<String>, rssi: i16) -> Self {
        Self {
            id,
            name,
            rssi,
            connection: ConnectionState::Disconnected,
            service_discovery: Discovery::default(),
            services: BTreeMap::new(),
            selected: None,
        }
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceRecord> {
        self.services.values()
    }

    pub fn service(&self, id: &ServiceId) -> Option<&ServiceRecord> {
        self.services.get(id)
    }

    pub fn selected_service(&self) -> Option<&ServiceRecord> {
        self.selected.as_ref().and_then(|id| self.services.get(id))
    }

    pub fn is_discovering_services(&self) -> bool {
        self.service_discovery.is_discovering()
    }

    /// First service, in stored order, whose RX and TX roles are assigned.
    pub fn first_publishable_service(&self) -> Option<&ServiceRecord> {
        self.services.values().find(|service| service.can_publish())
    }

    pub fn reduce(&mut self, action: PeripheralAction) -> Effects<PeripheralAction> {
        match action {
            PeripheralAction::Activate => self.activate(),
            PeripheralAction::UpdateRssi(rssi) => {
                self.rssi = rssi;
                Effects::none()
            }
            PeripheralAction::Connection(action) => self.reduce_connection(action),
            PeripheralAction::ServiceDiscovery(action) => {
                if let DiscoveryAction::Discovered(discovered) = &action {
                    self.services = discovered
                        .iter()
                        .map(|service| (service.id, ServiceRecord::new(service)))
                        .collect();
                    if self.selected.is_some_and(|id| !self.services.contains_key(&id)) {
                        self.selected = None;
                    }
                    info!("Peripheral {} has {} services", self.id, self.services.len());
                }
                // The discovery call itself runs in the connection group.
                self.service_discovery.reduce(action);
                Effects::none()
            }
            PeripheralAction::Service { id, action } => {
                let publish = matches!(action, ServiceAction::Publish);
                let Some(service) = self.services.get_mut(&id) else {
                    debug!("Unknown service {} on peripheral {}", id, self.id);
                    return Effects::none();
                };
                let mut effects = service
                    .reduce(&self.id, action)
                    .map(move |action| PeripheralAction::Service { id, action });
                if publish {
                    effects.extend(self.start_data_exchange(id));
                }
                effects
            }
            PeripheralAction::SelectedService(action) => match self.selected {
                Some(id) => Effects::send(PeripheralAction::Service { id, action }),
                None => Effects::none(),
            },
            PeripheralAction::SelectService(id) => {
                if id.is_some_and(|id| !self.services.contains_key(&id)) {
                    debug!("Cannot select unknown service on peripheral {}", self.id);
                    return Effects::none();
                }
                self.selected = id;
                Effects::send(PeripheralAction::SelectedService(ServiceAction::Activate))
            }
            PeripheralAction::StopDataExchange => {
                let mut effects = Effects::call(Call::RelayStop);
                effects.extend(Effects::cancel(CancelKey::peripheral(&self.id, Purpose::DataInput)));
                effects.extend(Effects::cancel(CancelKey::peripheral(&self.id, Purpose::DataOutput)));
                effects
            }
            PeripheralAction::Write(data) => Effects::call(Call::RelayWrite(data)),
            PeripheralAction::DidRead(_) | PeripheralAction::DidWrite => Effects::none(),
        }
    }

    /// Follows the platform's connection state for this peripheral.
    fn activate(&self) -> Effects<PeripheralAction> {
        Effects::subscribe(
            CancelKey::peripheral(&self.id, Purpose::Activation),
            vec![Subscription::new(Source::ConnectionState(self.id.clone()), |event| match event {
                Event::Connected(connected) => {
                    Some(PeripheralAction::Connection(ConnectionAction::Update { connected }))
                }
                _ => None,
            })],
        )
    }

    fn reduce_connection(&mut self, action: ConnectionAction) -> Effects<PeripheralAction> {
        let changed = self.connection.reduce(action.clone());
        match action {
            ConnectionAction::Connect => {
                let mut effects = self.activate();
                if changed {
                    info!("Connecting to peripheral {}", self.id);
                    effects.extend(Effects::call(Call::Connect(self.id.clone())));
                }
                effects
            }
            ConnectionAction::Disconnect if changed => {
                info!("Disconnecting from peripheral {}", self.id);
                Effects::call(Call::Disconnect(self.id.clone()))
            }
            ConnectionAction::Disconnect => Effects::none(),
            ConnectionAction::Update { connected: true } if changed => {
                info!("Peripheral {} connected", self.id);
                self.selected = None;
                let id = self.id.clone();
                let mut effects = Effects::subscribe(
                    CancelKey::peripheral(&id, Purpose::Connection),
                    vec![
                        Subscription::new(Source::Services(id.clone()), |event| match event {
                            Event::Services(found) => Some(PeripheralAction::ServiceDiscovery(
                                DiscoveryAction::Discovered(found),
                            )),
                            _ => None,
                        }),
                        Subscription::new(Source::Rssi(id.clone()), |event| match event {
                            Event::Rssi(rssi) => Some(PeripheralAction::UpdateRssi(rssi)),
                            _ => None,
                        }),
                    ],
                );
                effects.extend(Effects::send(PeripheralAction::ServiceDiscovery(
                    DiscoveryAction::Discover,
                )));
                effects
            }
            ConnectionAction::Update { connected: true } => Effects::none(),
            ConnectionAction::Update { connected: false } => {
                if changed {
                    info!("Peripheral {} disconnected", self.id);
                }
                self.selected = None;
                Effects::cancel(CancelKey::peripheral(&self.id, Purpose::Connection))
            }
        }
    }

    /// Cancels everything tied to this peripheral and marks it disconnected.
    /// Returns the disconnect call when the link was up or coming up.
    pub(crate) fn release(&mut self) -> Effects<PeripheralAction> {
        let mut effects = Effects::none();
        for purpose in [Purpose::Activation, Purpose::Connection] {
            effects.extend(Effects::cancel(CancelKey::peripheral(&self.id, purpose)));
        }
        if self.connection.is_active() {
            effects.extend(Effects::call(Call::Disconnect(self.id.clone())));
        }
        self.connection = ConnectionState::Disconnected;
        self.selected = None;
        effects
    }

    fn start_data_exchange(&self, id: ServiceId) -> Effects<PeripheralAction> {
        let Some(service) = self.services.get(&id) else {
            return Effects::none();
        };
        let (Some(rx), Some(tx)) = (service.rx(), service.tx()) else {
            debug!("Service {} has no RX/TX pair, not publishing", id);
            return Effects::none();
        };
        info!("Starting data exchange on {} (rx {}, tx {})", id, rx, tx);
        let target = RelayTarget { peripheral: self.id.clone(), service: id, rx, tx };

        let mut effects = Effects::subscribe(
            CancelKey::peripheral(&self.id, Purpose::DataOutput),
            vec![Subscription::new(Source::RelayOutput, |event| match event {
                Event::RelayRead(data) => Some(PeripheralAction::DidRead(data)),
                _ => None,
            })],
        );
        effects.extend(Effects::subscribe(
            CancelKey::peripheral(&self.id, Purpose::DataInput),
            vec![Subscription::new(Source::RelayStart(target), |event| match event {
                Event::RelayAck => Some(PeripheralAction::DidWrite),
                _ => None,
            })],
        ));
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::central::characteristic::{CharacteristicAction, Usage};
    use crate::core::central::types::{CharacteristicProperties, DiscoveredCharacteristic};
    use crate::core::effect::process;
    use uuid::Uuid;

    fn run(peripheral: &mut PeripheralRecord, action: PeripheralAction) -> Effects<PeripheralAction> {
        process(peripheral, action, PeripheralRecord::reduce)
    }

    fn connected_with_uart() -> PeripheralRecord {
        let mut peripheral = PeripheralRecord::new(PeripheralId::new("p1"), Some("uart".into()), -60);
        run(&mut peripheral, PeripheralAction::Connection(ConnectionAction::Connect));
        run(&mut peripheral, PeripheralAction::Connection(ConnectionAction::Update { connected: true }));
        run(
            &mut peripheral,
            PeripheralAction::ServiceDiscovery(DiscoveryAction::Discovered(vec![DiscoveredService {
                id: Uuid::from_u128(0x10),
                name: "uart".into(),
            }])),
        );
        run(
            &mut peripheral,
            PeripheralAction::Service {
                id: Uuid::from_u128(0x10),
                action: ServiceAction::CharacteristicDiscovery(DiscoveryAction::Discovered(vec![
                    DiscoveredCharacteristic {
                        id: Uuid::from_u128(1),
                        name: "rx".into(),
                        properties: CharacteristicProperties::NOTIFY,
                    },
                    DiscoveredCharacteristic {
                        id: Uuid::from_u128(2),
                        name: "tx".into(),
                        properties: CharacteristicProperties::WRITE_WITHOUT_RESPONSE,
                    },
                ])),
            },
        );
        peripheral
    }

    fn assign(peripheral: &mut PeripheralRecord, id: u128, usage: Usage) {
        run(
            peripheral,
            PeripheralAction::Service {
                id: Uuid::from_u128(0x10),
                action: ServiceAction::Characteristic {
                    id: Uuid::from_u128(id),
                    action: CharacteristicAction::Use(Some(usage)),
                },
            },
        );
    }

    #[test]
    fn connect_activates_and_calls_platform_once() {
        let mut peripheral = PeripheralRecord::new(PeripheralId::new("p1"), None, -70);
        let effects = run(&mut peripheral, PeripheralAction::Connection(ConnectionAction::Connect));

        assert_eq!(peripheral.connection, ConnectionState::Connecting);
        assert_eq!(effects.calls(), vec![&Call::Connect(PeripheralId::new("p1"))]);
        assert_eq!(
            effects.subscribed_keys(),
            vec![&CancelKey::peripheral(&PeripheralId::new("p1"), Purpose::Activation)]
        );

        let again = run(&mut peripheral, PeripheralAction::Connection(ConnectionAction::Connect));
        assert!(again.calls().is_empty());
    }

    #[test]
    fn confirmed_connection_starts_discovery_and_rssi() {
        let mut peripheral = PeripheralRecord::new(PeripheralId::new("p1"), None, -70);
        run(&mut peripheral, PeripheralAction::Connection(ConnectionAction::Connect));
        let effects = run(
            &mut peripheral,
            PeripheralAction::Connection(ConnectionAction::Update { connected: true }),
        );

        assert_eq!(peripheral.connection, ConnectionState::Connected);
        assert!(peripheral.is_discovering_services());
        let group = effects
            .subscriptions(&CancelKey::peripheral(&peripheral.id, Purpose::Connection))
            .expect("connection group");
        let sources: Vec<_> = group.iter().map(|s| s.source.clone()).collect();
        assert_eq!(
            sources,
            vec![Source::Services(peripheral.id.clone()), Source::Rssi(peripheral.id.clone())]
        );
        assert_eq!(group[1].action_for(Event::Rssi(-42)), Some(PeripheralAction::UpdateRssi(-42)));
    }

    #[test]
    fn confirmed_disconnect_cancels_connection_group() {
        let mut peripheral = connected_with_uart();
        run(&mut peripheral, PeripheralAction::SelectService(Some(Uuid::from_u128(0x10))));
        assert!(peripheral.selected_service().is_some());

        let effects = run(
            &mut peripheral,
            PeripheralAction::Connection(ConnectionAction::Update { connected: false }),
        );
        assert_eq!(
            effects.cancelled_keys(),
            vec![&CancelKey::peripheral(&peripheral.id, Purpose::Connection)]
        );
        assert!(peripheral.selected_service().is_none());
        assert_eq!(peripheral.connection, ConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_calls_platform_only_when_active() {
        let mut peripheral = connected_with_uart();
        let effects = run(&mut peripheral, PeripheralAction::Connection(ConnectionAction::Disconnect));
        assert_eq!(effects.calls(), vec![&Call::Disconnect(peripheral.id.clone())]);
        assert_eq!(peripheral.connection, ConnectionState::Disconnecting);

        let mut idle = PeripheralRecord::new(PeripheralId::new("p2"), None, -70);
        assert!(run(&mut idle, PeripheralAction::Connection(ConnectionAction::Disconnect)).is_empty());
    }

    #[test]
    fn publish_requires_both_roles() {
        let mut peripheral = connected_with_uart();
        assign(&mut peripheral, 1, Usage::Notify);
        let effects = run(
            &mut peripheral,
            PeripheralAction::Service { id: Uuid::from_u128(0x10), action: ServiceAction::Publish },
        );
        assert!(effects.subscribed_keys().is_empty());

        assign(&mut peripheral, 2, Usage::WriteWithoutResponse);
        let effects = run(
            &mut peripheral,
            PeripheralAction::Service { id: Uuid::from_u128(0x10), action: ServiceAction::Publish },
        );
        let input = effects
            .subscriptions(&CancelKey::peripheral(&peripheral.id, Purpose::DataInput))
            .expect("relay start");
        assert_eq!(
            input[0].source,
            Source::RelayStart(RelayTarget {
                peripheral: peripheral.id.clone(),
                service: Uuid::from_u128(0x10),
                rx: Uuid::from_u128(1),
                tx: Uuid::from_u128(2),
            })
        );
        let output = effects
            .subscriptions(&CancelKey::peripheral(&peripheral.id, Purpose::DataOutput))
            .expect("relay output");
        assert_eq!(
            output[0].action_for(Event::RelayRead(vec![1, 2])),
            Some(PeripheralAction::DidRead(vec![1, 2]))
        );
    }

    #[test]
    fn stop_data_exchange_stops_relay_and_cancels_both_groups() {
        let mut peripheral = connected_with_uart();
        let effects = run(&mut peripheral, PeripheralAction::StopDataExchange);
        assert_eq!(effects.calls(), vec![&Call::RelayStop]);
        assert_eq!(
            effects.cancelled_keys(),
            vec![
                &CancelKey::peripheral(&peripheral.id, Purpose::DataInput),
                &CancelKey::peripheral(&peripheral.id, Purpose::DataOutput),
            ]
        );
    }

    #[test]
    fn rediscovery_drops_missing_selection() {
        let mut peripheral = connected_with_uart();
        run(&mut peripheral, PeripheralAction::SelectService(Some(Uuid::from_u128(0x10))));
        run(
            &mut peripheral,
            PeripheralAction::ServiceDiscovery(DiscoveryAction::Discovered(vec![DiscoveredService {
                id: Uuid::from_u128(0x20),
                name: "other".into(),
            }])),
        );
        assert!(peripheral.selected_service().is_none());
        assert!(peripheral.service(&Uuid::from_u128(0x10)).is_none());
    }

    #[test]
    fn write_is_fire_and_forget() {
        let mut peripheral = connected_with_uart();
        let effects = run(&mut peripheral, PeripheralAction::Write(vec![0xde, 0xad]));
        assert_eq!(effects.calls(), vec![&Call::RelayWrite(vec![0xde, 0xad])]);
    }
}
