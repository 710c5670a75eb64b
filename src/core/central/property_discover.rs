//! Generic discover-or-idle machine, shared by service, included-service and
//! characteristic discovery.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Discovery<T> {
    /// Holds the last complete result.
    Idle(T),
    Discovering,
}

impl<T: Default> Default for Discovery<T> {
    fn default() -> Self {
        Discovery::Idle(T::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryAction<T> {
    Discover,
    Discovered(T),
}

/// How the machine reacted to an action; the owner issues the matching
/// external discovery call on `Started`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    Started,
    AlreadyDiscovering,
    Completed,
}

impl<T> Discovery<T> {
    pub fn reduce(&mut self, action: DiscoveryAction<T>) -> DiscoveryOutcome {
        match action {
            DiscoveryAction::Discover if self.is_discovering() => DiscoveryOutcome::AlreadyDiscovering,
            DiscoveryAction::Discover => {
                *self = Discovery::Discovering;
                DiscoveryOutcome::Started
            }
            DiscoveryAction::Discovered(result) => {
                *self = Discovery::Idle(result);
                DiscoveryOutcome::Completed
            }
        }
    }

    pub fn is_discovering(&self) -> bool {
        matches!(self, Discovery::Discovering)
    }

    pub fn last_result(&self) -> Option<&T> {
        match self {
            Discovery::Idle(result) => Some(result),
            Discovery::Discovering => None,
        }
    }
}
