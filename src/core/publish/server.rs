//! Network server publisher: transport and port configuration, the
//! start/stop lifecycle and the outbound byte path.

use std::io;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::effect::{Call, CancelKey, Effects, Event, Purpose, Source, Subscription};
use crate::core::publish::port::{validate_port, PortError};

pub const DEFAULT_PORT: u16 = 40404;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Tcp,
    Udp,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
}

/// Live network endpoint the publisher drives.
#[async_trait]
pub trait Server: Send + Sync {
    /// Binds the listener and returns the inbound byte stream. The stream
    /// ends when the server is stopped or `cancel` fires, including while
    /// the bind is still in flight.
    async fn start(
        &self,
        transport: Transport,
        port: u16,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Vec<u8>>, ServerError>;

    /// Idempotent.
    fn stop(&self);

    /// Writes to the tracked connection or peer; dropped when there is none.
    fn send(&self, data: Vec<u8>);
}

/// Transport and port text remembered between publish sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerSettings {
    pub transport: Transport,
    pub port_input: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { transport: Transport::default(), port_input: DEFAULT_PORT.to_string() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ServerPhase {
    #[default]
    Stopped,
    Starting,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerState {
    pub transport: Transport,
    pub port_input: String,
    port: Result<u16, PortError>,
    phase: ServerPhase,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new(&ServerSettings::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    UpdatePort(String),
    SetTransport(Transport),
    Start,
    Started,
    StartFailure(String),
    Stop,
    DidStop,
    /// Bytes from the peripheral, to be sent to the network peer.
    BleToBridge(Vec<u8>),
    /// Bytes received from the network peer.
    BridgeToBle(Vec<u8>),
}

impl ServerState {
    pub fn new(settings: &ServerSettings) -> Self {
        Self {
            transport: settings.transport,
            port_input: settings.port_input.clone(),
            port: validate_port(&settings.port_input),
            phase: ServerPhase::Stopped,
        }
    }

    pub fn port(&self) -> &Result<u16, PortError> {
        &self.port
    }

    pub fn phase(&self) -> ServerPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == ServerPhase::Running
    }

    /// Starting or running.
    pub fn is_active(&self) -> bool {
        self.phase != ServerPhase::Stopped
    }

    pub fn settings(&self) -> ServerSettings {
        ServerSettings { transport: self.transport, port_input: self.port_input.clone() }
    }

    pub fn reduce(&mut self, action: ServerAction) -> Effects<ServerAction> {
        match action {
            ServerAction::UpdatePort(input) => {
                self.port = validate_port(&input);
                if let Err(error) = &self.port {
                    debug!("Port input rejected: {}", error);
                }
                self.port_input = input;
                Effects::none()
            }
            ServerAction::SetTransport(transport) if self.phase == ServerPhase::Stopped => {
                self.transport = transport;
                Effects::none()
            }
            ServerAction::SetTransport(_) => {
                debug!("Transport is fixed while the server is active");
                Effects::none()
            }
            ServerAction::Start => {
                let Ok(port) = self.port else {
                    debug!("Not starting server without a valid port");
                    return Effects::none();
                };
                if self.phase != ServerPhase::Stopped {
                    return Effects::none();
                }
                info!("Starting {:?} server on port {}", self.transport, port);
                self.phase = ServerPhase::Starting;
                Effects::subscribe(
                    CancelKey::central(Purpose::Server),
                    vec![Subscription::new(
                        Source::ServerStart { transport: self.transport, port },
                        |event| match event {
                            Event::ServerStarted => Some(ServerAction::Started),
                            Event::ServerStartFailed(message) => Some(ServerAction::StartFailure(message)),
                            Event::ServerReceived(data) => Some(ServerAction::BridgeToBle(data)),
                            _ => None,
                        },
                    )],
                )
            }
            ServerAction::Started if self.phase == ServerPhase::Starting => {
                info!("Server running");
                self.phase = ServerPhase::Running;
                Effects::none()
            }
            ServerAction::Started => Effects::none(),
            ServerAction::StartFailure(message) => {
                warn!("Server failed to start: {}", message);
                self.phase = ServerPhase::Stopped;
                Effects::cancel(CancelKey::central(Purpose::Server))
            }
            ServerAction::Stop if self.is_active() => {
                info!("Stopping server");
                let mut effects = Effects::cancel(CancelKey::central(Purpose::Server));
                effects.extend(Effects::call(Call::ServerStop));
                effects.extend(Effects::send(ServerAction::DidStop));
                effects
            }
            ServerAction::Stop => Effects::none(),
            ServerAction::DidStop => {
                self.phase = ServerPhase::Stopped;
                Effects::none()
            }
            ServerAction::BleToBridge(data) if self.is_running() => Effects::call(Call::ServerSend(data)),
            ServerAction::BleToBridge(_) | ServerAction::BridgeToBle(_) => Effects::none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::effect::process;

    fn run(state: &mut ServerState, action: ServerAction) -> Effects<ServerAction> {
        process(state, action, ServerState::reduce)
    }

    #[test]
    fn defaults_to_tcp_on_40404() {
        let state = ServerState::default();
        assert_eq!(state.transport, Transport::Tcp);
        assert_eq!(state.port(), &Ok(DEFAULT_PORT));
        assert!(!state.is_running());
    }

    #[test]
    fn start_requires_valid_port() {
        let mut state = ServerState::default();
        run(&mut state, ServerAction::UpdatePort("abc".into()));
        assert!(run(&mut state, ServerAction::Start).is_empty());
        assert_eq!(state.phase(), ServerPhase::Stopped);

        run(&mut state, ServerAction::UpdatePort("9000".into()));
        let effects = run(&mut state, ServerAction::Start);
        let group = effects
            .subscriptions(&CancelKey::central(Purpose::Server))
            .expect("server subscription");
        assert_eq!(group[0].source, Source::ServerStart { transport: Transport::Tcp, port: 9000 });
        assert_eq!(state.phase(), ServerPhase::Starting);
    }

    #[test]
    fn start_failure_returns_to_stopped() {
        let mut state = ServerState::default();
        run(&mut state, ServerAction::Start);
        let effects = run(&mut state, ServerAction::StartFailure("address in use".into()));
        assert!(!state.is_active());
        assert_eq!(effects.cancelled_keys(), vec![&CancelKey::central(Purpose::Server)]);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut state = ServerState::default();
        run(&mut state, ServerAction::Start);
        run(&mut state, ServerAction::Started);
        assert!(state.is_running());

        let effects = run(&mut state, ServerAction::Stop);
        assert_eq!(effects.calls(), vec![&Call::ServerStop]);
        assert!(!state.is_active());
        assert!(run(&mut state, ServerAction::Stop).is_empty());
    }

    #[test]
    fn outbound_bytes_only_while_running() {
        let mut state = ServerState::default();
        assert!(run(&mut state, ServerAction::BleToBridge(vec![1])).is_empty());
        run(&mut state, ServerAction::Start);
        assert!(run(&mut state, ServerAction::BleToBridge(vec![1])).is_empty());
        run(&mut state, ServerAction::Started);
        assert_eq!(
            run(&mut state, ServerAction::BleToBridge(vec![1, 2])).calls(),
            vec![&Call::ServerSend(vec![1, 2])]
        );
    }

    #[test]
    fn transport_locked_while_active() {
        let mut state = ServerState::default();
        run(&mut state, ServerAction::SetTransport(Transport::Udp));
        assert_eq!(state.transport, Transport::Udp);
        run(&mut state, ServerAction::Start);
        run(&mut state, ServerAction::SetTransport(Transport::Tcp));
        assert_eq!(state.transport, Transport::Udp);
    }

    #[test]
    fn transport_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Transport::Udp).ok().as_deref(), Some("\"udp\""));
    }
}
