//! Peripheral connection lifecycle.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    Connect,
    Disconnect,
    /// Confirmed state reported by the platform.
    Update { connected: bool },
}

impl ConnectionState {
    /// Applies an action and returns whether the state changed.
    pub fn reduce(&mut self, action: ConnectionAction) -> bool {
        let next = match action {
            ConnectionAction::Update { connected: true } => ConnectionState::Connected,
            ConnectionAction::Update { connected: false } => ConnectionState::Disconnected,
            ConnectionAction::Connect if *self == ConnectionState::Disconnected => ConnectionState::Connecting,
            ConnectionAction::Disconnect
                if matches!(self, ConnectionState::Connected | ConnectionState::Connecting) =>
            {
                ConnectionState::Disconnecting
            }
            ConnectionAction::Connect | ConnectionAction::Disconnect => *self,
        };
        let changed = next != *self;
        *self = next;
        changed
    }

    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Connecting)
    }
}
