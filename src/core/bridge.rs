//! Bridge orchestrator. Composes the central adapter with an optional
//! publish session and relays bytes between them.

use log::{debug, info};
use serde::Serialize;

use crate::core::central::adapter::{AdapterState, CentralAction};
use crate::core::central::connection::ConnectionState;
use crate::core::central::discover::DiscoverAction;
use crate::core::central::peripheral::PeripheralAction;
use crate::core::central::service::ServiceAction;
use crate::core::central::types::{PeripheralId, RelayTarget};
use crate::core::effect::{Call, CancelKey, Effects, Purpose};
use crate::core::publish::server::{ServerAction, ServerSettings};
use crate::core::publish::{PublishAction, PublishState};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BridgeState {
    pub central: AdapterState,
    /// Present while the selected peripheral is connected and has a
    /// service with both relay roles assigned.
    pub publish: Option<PublishState>,
    /// Peripheral the current publish session relays for.
    relayed: Option<PeripheralId>,
    /// Characteristics the running relay is bound to.
    published: Option<RelayTarget>,
    pub settings: ServerSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeAction {
    Setup,
    Central(CentralAction),
    Publish(PublishAction),
}

impl BridgeState {
    pub fn new(settings: ServerSettings) -> Self {
        Self { settings, ..Self::default() }
    }

    pub fn relayed(&self) -> Option<&PeripheralId> {
        self.relayed.as_ref()
    }

    pub fn published(&self) -> Option<&RelayTarget> {
        self.published.as_ref()
    }

    pub fn reduce(&mut self, action: BridgeAction) -> Effects<BridgeAction> {
        match action {
            BridgeAction::Setup => Effects::send(BridgeAction::Central(CentralAction::Setup)),
            BridgeAction::Central(action) => {
                let forwarded = self.route_central(&action);
                let mut effects = self.central.reduce(action).map(BridgeAction::Central);
                effects.extend(self.reconcile_session());
                if let Some(forwarded) = forwarded {
                    effects.extend(Effects::send(forwarded));
                }
                effects
            }
            BridgeAction::Publish(action) => self.reduce_publish(action),
        }
    }

    /// Session-relevant follow-up for a central action, decided before the
    /// adapter handles it.
    fn route_central(&self, action: &CentralAction) -> Option<BridgeAction> {
        self.publish.as_ref()?;
        match action {
            CentralAction::Discover(DiscoverAction::Peripheral { id, action })
                if self.relayed.as_ref() == Some(id) =>
            {
                match action {
                    PeripheralAction::DidRead(data) => Some(BridgeAction::Publish(PublishAction::Server(
                        ServerAction::BleToBridge(data.clone()),
                    ))),
                    other => Some(BridgeAction::Publish(PublishAction::Peripheral(other.clone()))),
                }
            }
            _ => None,
        }
    }

    fn reduce_publish(&mut self, action: PublishAction) -> Effects<BridgeAction> {
        let Some(publish) = self.publish.as_mut() else {
            match action {
                PublishAction::Server(ServerAction::UpdatePort(input)) => self.settings.port_input = input,
                PublishAction::Server(ServerAction::SetTransport(transport)) => {
                    self.settings.transport = transport
                }
                other => debug!("No publish session, dropping {:?}", other),
            }
            return Effects::none();
        };

        let follow_up = match &action {
            PublishAction::Server(ServerAction::Started) => None,
            PublishAction::Server(ServerAction::BridgeToBle(data)) => Some(BridgeAction::Central(
                CentralAction::Discover(DiscoverAction::SelectedPeripheral(PeripheralAction::Write(
                    data.clone(),
                ))),
            )),
            PublishAction::Server(ServerAction::DidStop) => Some(BridgeAction::Central(
                CentralAction::Discover(DiscoverAction::SelectedPeripheral(
                    PeripheralAction::StopDataExchange,
                )),
            )),
            _ => None,
        };
        let started = matches!(action, PublishAction::Server(ServerAction::Started))
            && !publish.server.is_running();

        let mut effects = publish.reduce(action).map(BridgeAction::Publish);
        self.settings = publish.server.settings();
        let running = publish.server.is_running();

        if !running {
            self.published = None;
        } else if started {
            effects.extend(self.publish_first_service());
        }
        if let Some(follow_up) = follow_up {
            effects.extend(Effects::send(follow_up));
        }
        effects
    }

    /// RX/TX pair of the first publishable service of the relayed
    /// peripheral, in stored order.
    fn relay_target(&self) -> Option<RelayTarget> {
        let id = self.relayed.as_ref()?;
        let service = self.central.discover()?.peripheral(id)?.first_publishable_service()?;
        Some(RelayTarget {
            peripheral: id.clone(),
            service: service.id,
            rx: service.rx()?,
            tx: service.tx()?,
        })
    }

    /// Starts the relay on the first publishable service. Starting again
    /// rebinds a running relay.
    fn publish_first_service(&mut self) -> Effects<BridgeAction> {
        self.published = self.relay_target();
        match &self.published {
            Some(target) => {
                info!("Publishing service {} of {}", target.service, target.peripheral);
                Effects::send(BridgeAction::Central(CentralAction::Discover(
                    DiscoverAction::Peripheral {
                        id: target.peripheral.clone(),
                        action: PeripheralAction::Service {
                            id: target.service,
                            action: ServiceAction::Publish,
                        },
                    },
                )))
            }
            None => Effects::none(),
        }
    }

    fn eligible_peripheral(&self) -> Option<PeripheralId> {
        let peripheral = self.central.discover()?.selected_peripheral()?;
        (peripheral.connection == ConnectionState::Connected
            && peripheral.first_publishable_service().is_some())
        .then(|| peripheral.id.clone())
    }

    /// Creates or tears down the publish session to match eligibility.
    fn reconcile_session(&mut self) -> Effects<BridgeAction> {
        let eligible = self.eligible_peripheral();
        if eligible.is_some() && eligible == self.relayed && self.publish.is_some() {
            if self.published.is_some() && self.published != self.relay_target() {
                info!("Relay roles changed, rebinding");
                return self.publish_first_service();
            }
            return Effects::none();
        }

        let mut effects = self.teardown_session();
        if let Some(id) = eligible {
            info!("Publish session ready for {}", id);
            self.publish = Some(PublishState::new(&self.settings));
            self.relayed = Some(id);
        }
        effects
    }

    fn teardown_session(&mut self) -> Effects<BridgeAction> {
        self.published = None;
        let Some(publish) = self.publish.take() else {
            self.relayed = None;
            return Effects::none();
        };
        let mut effects = Effects::none();
        if publish.server.is_active() {
            info!("Publish session ended, stopping server");
            effects.extend(Effects::cancel(CancelKey::central(Purpose::Server)));
            effects.extend(Effects::call(Call::ServerStop));
            effects.extend(Effects::call(Call::RelayStop));
        } else {
            info!("Publish session ended");
        }
        if let Some(id) = self.relayed.take() {
            effects.extend(Effects::cancel(CancelKey::peripheral(&id, Purpose::DataInput)));
            effects.extend(Effects::cancel(CancelKey::peripheral(&id, Purpose::DataOutput)));
        }
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::central::authorization::{AuthorizationAction, AuthorizationState};
    use crate::core::central::characteristic::{CharacteristicAction, Usage};
    use crate::core::central::connection::ConnectionAction;
    use crate::core::central::property_discover::DiscoveryAction;
    use crate::core::central::scan::ScanAction;
    use crate::core::central::types::{
        CharacteristicProperties, DiscoveredCharacteristic, DiscoveredPeripheral, DiscoveredService,
    };
    use crate::core::central::PowerEvent;
    use crate::core::effect::{process, Event, Source};
    use crate::core::publish::Transport;
    use uuid::Uuid;

    const SERVICE: Uuid = Uuid::from_u128(0x6e40_0001);
    const RX: Uuid = Uuid::from_u128(0x6e40_0003);
    const TX: Uuid = Uuid::from_u128(0x6e40_0002);
    const TX2: Uuid = Uuid::from_u128(0x6e40_0004);

    fn run(state: &mut BridgeState, action: BridgeAction) -> Effects<BridgeAction> {
        process(state, action, BridgeState::reduce)
    }

    fn central(action: CentralAction) -> BridgeAction {
        BridgeAction::Central(action)
    }

    fn discover(action: DiscoverAction) -> BridgeAction {
        central(CentralAction::Discover(action))
    }

    fn peripheral(id: &str, action: PeripheralAction) -> BridgeAction {
        discover(DiscoverAction::Peripheral { id: PeripheralId::new(id), action })
    }

    fn server(action: ServerAction) -> BridgeAction {
        BridgeAction::Publish(PublishAction::Server(action))
    }

    fn use_characteristic(id: &str, characteristic: Uuid, usage: Option<Usage>) -> BridgeAction {
        peripheral(
            id,
            PeripheralAction::Service {
                id: SERVICE,
                action: ServiceAction::Characteristic {
                    id: characteristic,
                    action: CharacteristicAction::Use(usage),
                },
            },
        )
    }

    fn discovering(ids: &[&str]) -> BridgeState {
        let mut state = BridgeState::default();
        run(&mut state, BridgeAction::Setup);
        run(&mut state, central(CentralAction::PowerUpdate(PowerEvent::PoweredOn)));
        run(
            &mut state,
            central(CentralAction::Authorization(AuthorizationAction::Update(
                AuthorizationState::AllowedAlways,
            ))),
        );
        run(&mut state, discover(DiscoverAction::Scan(ScanAction::Start)));
        run(&mut state, discover(DiscoverAction::Scan(ScanAction::Started)));
        let batch = ids
            .iter()
            .map(|id| DiscoveredPeripheral { id: PeripheralId::new(*id), name: None, rssi: -60 })
            .collect();
        run(&mut state, discover(DiscoverAction::Discovered(batch)));
        state
    }

    fn connected_with_roles(id: &str) -> BridgeState {
        let mut state = discovering(&[id]);
        connect_with_roles(&mut state, id);
        state
    }

    fn connect_with_roles(state: &mut BridgeState, id: &str) {
        run(state, discover(DiscoverAction::Select(Some(PeripheralId::new(id)))));
        run(state, peripheral(id, PeripheralAction::Connection(ConnectionAction::Update { connected: true })));
        run(
            state,
            peripheral(
                id,
                PeripheralAction::ServiceDiscovery(DiscoveryAction::Discovered(vec![DiscoveredService {
                    id: SERVICE,
                    name: "UART".into(),
                }])),
            ),
        );
        run(state, peripheral(id, PeripheralAction::SelectService(Some(SERVICE))));
        run(
            state,
            peripheral(
                id,
                PeripheralAction::Service {
                    id: SERVICE,
                    action: ServiceAction::CharacteristicDiscovery(DiscoveryAction::Discovered(vec![
                        DiscoveredCharacteristic {
                            id: RX,
                            name: "RX".into(),
                            properties: CharacteristicProperties::NOTIFY,
                        },
                        DiscoveredCharacteristic {
                            id: TX,
                            name: "TX".into(),
                            properties: CharacteristicProperties::WRITE_WITHOUT_RESPONSE
                                | CharacteristicProperties::WRITE,
                        },
                        DiscoveredCharacteristic {
                            id: TX2,
                            name: "TX2".into(),
                            properties: CharacteristicProperties::WRITE_WITHOUT_RESPONSE,
                        },
                    ])),
                },
            ),
        );
        run(state, use_characteristic(id, RX, Some(Usage::Notify)));
        run(state, use_characteristic(id, TX, Some(Usage::WriteWithoutResponse)));
    }

    fn running(id: &str) -> BridgeState {
        let mut state = connected_with_roles(id);
        run(&mut state, server(ServerAction::Start));
        run(&mut state, server(ServerAction::Started));
        state
    }

    #[test]
    fn session_appears_when_both_roles_are_assigned() {
        let mut state = discovering(&["a"]);
        assert!(state.publish.is_none());

        state = connected_with_roles("a");
        assert!(state.publish.is_some());
        assert_eq!(state.relayed(), Some(&PeripheralId::new("a")));

        run(&mut state, use_characteristic("a", TX, None));
        assert!(state.publish.is_none());
    }

    #[test]
    fn server_started_publishes_first_service() {
        let mut state = connected_with_roles("a");
        run(&mut state, server(ServerAction::Start));
        let effects = run(&mut state, server(ServerAction::Started));

        let key = CancelKey::peripheral(&PeripheralId::new("a"), Purpose::DataInput);
        let group = effects.subscriptions(&key).expect("relay start");
        assert_eq!(
            group[0].source,
            Source::RelayStart(RelayTarget {
                peripheral: PeripheralId::new("a"),
                service: SERVICE,
                rx: RX,
                tx: TX,
            })
        );
    }

    #[test]
    fn moving_a_role_rebinds_the_running_relay() {
        let mut state = running("a");
        let a = PeripheralId::new("a");
        assert_eq!(state.published().map(|target| target.tx), Some(TX));

        let effects = run(&mut state, use_characteristic("a", TX2, Some(Usage::WriteWithoutResponse)));
        let group = effects
            .subscriptions(&CancelKey::peripheral(&a, Purpose::DataInput))
            .expect("relay restart");
        assert_eq!(
            group[0].source,
            Source::RelayStart(RelayTarget { peripheral: a.clone(), service: SERVICE, rx: RX, tx: TX2 })
        );
        assert!(effects.subscriptions(&CancelKey::peripheral(&a, Purpose::DataOutput)).is_some());
        assert!(!effects.calls().contains(&&Call::ServerStop));
        assert!(state.publish.as_ref().is_some_and(|publish| publish.server.is_running()));
        assert_eq!(state.published().map(|target| target.tx), Some(TX2));

        let effects = run(&mut state, server(ServerAction::BridgeToBle(vec![5])));
        assert_eq!(effects.calls(), vec![&Call::RelayWrite(vec![5])]);
    }

    #[test]
    fn role_changes_without_a_running_server_start_no_relay() {
        let mut state = connected_with_roles("a");
        let effects = run(&mut state, use_characteristic("a", TX2, Some(Usage::WriteWithoutResponse)));
        let a = PeripheralId::new("a");
        assert!(effects.subscriptions(&CancelKey::peripheral(&a, Purpose::DataInput)).is_none());
        assert!(state.publish.is_some());
        assert!(state.published().is_none());
    }

    #[test]
    fn stopped_server_forgets_the_relay_target() {
        let mut state = running("a");
        run(&mut state, server(ServerAction::Stop));
        assert!(state.published().is_none());

        let effects = run(&mut state, use_characteristic("a", TX2, Some(Usage::WriteWithoutResponse)));
        let a = PeripheralId::new("a");
        assert!(effects.subscriptions(&CancelKey::peripheral(&a, Purpose::DataInput)).is_none());
    }

    #[test]
    fn bytes_flow_in_both_directions() {
        let mut state = running("a");

        let effects = run(&mut state, peripheral("a", PeripheralAction::DidRead(vec![1, 2, 3])));
        assert_eq!(effects.calls(), vec![&Call::ServerSend(vec![1, 2, 3])]);

        let effects = run(&mut state, server(ServerAction::BridgeToBle(vec![9, 8])));
        assert_eq!(effects.calls(), vec![&Call::RelayWrite(vec![9, 8])]);

        let traffic = state.publish.as_ref().map(|p| p.traffic);
        assert_eq!(traffic.map(|t| (t.ble_to_bridge, t.bridge_to_ble)), Some((3, 2)));
    }

    #[test]
    fn server_stop_stops_data_exchange() {
        let mut state = running("a");
        let effects = run(&mut state, server(ServerAction::Stop));
        assert_eq!(effects.calls(), vec![&Call::ServerStop, &Call::RelayStop]);
        assert!(effects
            .cancelled_keys()
            .contains(&&CancelKey::peripheral(&PeripheralId::new("a"), Purpose::DataInput)));
    }

    #[test]
    fn power_off_stops_everything_and_forgets_selection() {
        let mut state = running("a");
        let effects = run(&mut state, central(CentralAction::PowerUpdate(PowerEvent::PoweredOff)));

        assert!(state.publish.is_none());
        assert!(effects.calls().contains(&&Call::ServerStop));
        assert!(effects.calls().contains(&&Call::RelayStop));
        let a = PeripheralId::new("a");
        assert!(effects.cancelled_keys().contains(&&CancelKey::peripheral(&a, Purpose::DataOutput)));
        assert!(effects.cancelled_keys().contains(&&CancelKey::central(Purpose::Server)));

        run(&mut state, central(CentralAction::PowerUpdate(PowerEvent::PoweredOn)));
        assert_eq!(
            state.central,
            AdapterState::Authorization(AuthorizationState::NotDetermined)
        );
        run(
            &mut state,
            central(CentralAction::Authorization(AuthorizationAction::Update(
                AuthorizationState::AllowedAlways,
            ))),
        );
        let discover = state.central.discover().expect("discovering");
        assert!(discover.selected_id().is_none());
        assert_eq!(discover.peripherals().count(), 0);
    }

    #[test]
    fn peripheral_disconnect_ends_session() {
        let mut state = running("a");
        let effects = run(
            &mut state,
            peripheral("a", PeripheralAction::Connection(ConnectionAction::Update { connected: false })),
        );
        assert!(state.publish.is_none());
        assert!(effects.calls().contains(&&Call::ServerStop));
    }

    #[test]
    fn port_edits_survive_sessions() {
        let mut state = discovering(&["a"]);
        run(&mut state, server(ServerAction::UpdatePort("5555".into())));
        run(&mut state, server(ServerAction::SetTransport(Transport::Udp)));
        assert_eq!(state.settings.port_input, "5555");

        connect_with_roles(&mut state, "a");
        let session = state.publish.as_ref().expect("session");
        assert_eq!(session.server.port(), &Ok(5555));
        assert_eq!(session.server.transport, Transport::Udp);

        run(&mut state, server(ServerAction::UpdatePort("6000".into())));
        assert_eq!(state.settings.port_input, "6000");
    }

    #[test]
    fn server_events_map_to_actions() {
        let mut state = connected_with_roles("a");
        let effects = run(&mut state, server(ServerAction::Start));
        let group = effects
            .subscriptions(&CancelKey::central(Purpose::Server))
            .expect("server group");
        assert_eq!(
            group[0].action_for(Event::ServerReceived(vec![7])),
            Some(server(ServerAction::BridgeToBle(vec![7])))
        );
    }
}
