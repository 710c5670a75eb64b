//! A publish session: the network server, its traffic counters and the
//! peripheral actions relayed while the session exists.

pub mod port;
pub mod server;
pub mod traffic;

use serde::Serialize;

use crate::core::central::connection::ConnectionAction;
use crate::core::central::peripheral::PeripheralAction;
use crate::core::effect::Effects;

pub use port::{validate_port, PortError};
pub use server::{Server, ServerAction, ServerError, ServerSettings, ServerState, Transport};
pub use traffic::TrafficCounters;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishState {
    pub server: ServerState,
    pub traffic: TrafficCounters,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishAction {
    /// Actions of the relayed peripheral, observed by the session.
    Peripheral(PeripheralAction),
    Server(ServerAction),
}

impl PublishState {
    pub fn new(settings: &ServerSettings) -> Self {
        Self { server: ServerState::new(settings), traffic: TrafficCounters::default() }
    }

    pub fn reduce(&mut self, action: PublishAction) -> Effects<PublishAction> {
        match action {
            PublishAction::Server(action) => {
                self.traffic.record(&action);
                self.server.reduce(action).map(PublishAction::Server)
            }
            PublishAction::Peripheral(PeripheralAction::Connection(ConnectionAction::Update {
                connected: false,
            })) => Effects::send(PublishAction::Server(ServerAction::Stop)),
            PublishAction::Peripheral(_) => Effects::none(),
        }
    }
}
