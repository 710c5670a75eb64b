//! Characteristic records and role (usage) assignment.

use serde::Serialize;

use crate::core::central::types::{CharacteristicId, CharacteristicProperties, DiscoveredCharacteristic};

/// What a characteristic can be used for. `None` (unassigned) is modelled as
/// `Option<Usage>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Usage {
    Broadcast,
    Read,
    WriteWithoutResponse,
    Write,
    Notify,
    Indicate,
    AuthenticatedSignedWrites,
    ExtendedProperties,
}

impl Usage {
    pub const ALL: [Usage; 8] = [
        Usage::Broadcast,
        Usage::Read,
        Usage::WriteWithoutResponse,
        Usage::Write,
        Usage::Notify,
        Usage::Indicate,
        Usage::AuthenticatedSignedWrites,
        Usage::ExtendedProperties,
    ];

    /// Roles the bridge assigns: RX via notifications, TX via unacknowledged writes.
    pub const BRIDGE_ROLES: [Usage; 2] = [Usage::Notify, Usage::WriteWithoutResponse];

    pub fn property(self) -> CharacteristicProperties {
        match self {
            Usage::Broadcast => CharacteristicProperties::BROADCAST,
            Usage::Read => CharacteristicProperties::READ,
            Usage::WriteWithoutResponse => CharacteristicProperties::WRITE_WITHOUT_RESPONSE,
            Usage::Write => CharacteristicProperties::WRITE,
            Usage::Notify => CharacteristicProperties::NOTIFY,
            Usage::Indicate => CharacteristicProperties::INDICATE,
            Usage::AuthenticatedSignedWrites => CharacteristicProperties::AUTHENTICATED_SIGNED_WRITES,
            Usage::ExtendedProperties => CharacteristicProperties::EXTENDED_PROPERTIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharacteristicAction {
    Use(Option<Usage>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CharacteristicRecord {
    pub id: CharacteristicId,
    pub name: String,
    pub properties: CharacteristicProperties,
    usage: Option<Usage>,
    supported_usage: Vec<Option<Usage>>,
    can_be_used_for: Vec<Option<Usage>>,
}

impl CharacteristicRecord {
    pub fn new(discovered: &DiscoveredCharacteristic) -> Self {
        let properties = discovered.properties;
        let supported_usage: Vec<Option<Usage>> = std::iter::once(None)
            .chain(
                Usage::ALL
                    .into_iter()
                    .filter(|usage| properties.contains(usage.property()))
                    .map(Some),
            )
            .collect();
        let can_be_used_for = supported_usage
            .iter()
            .copied()
            .filter(|usage| usage.is_none_or(|usage| Usage::BRIDGE_ROLES.contains(&usage)))
            .collect();

        Self {
            id: discovered.id,
            name: discovered.name.clone(),
            properties,
            usage: None,
            supported_usage,
            can_be_used_for,
        }
    }

    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }

    /// Every usage the property flags allow, unassigned first.
    pub fn supported_usage(&self) -> &[Option<Usage>] {
        &self.supported_usage
    }

    /// Supported usages restricted to the bridge roles (plus unassigned).
    pub fn can_be_used_for(&self) -> &[Option<Usage>] {
        &self.can_be_used_for
    }

    /// Applies an action; returns whether it was accepted.
    pub fn reduce(&mut self, action: CharacteristicAction) -> bool {
        match action {
            CharacteristicAction::Use(usage) if self.can_be_used_for.contains(&usage) => {
                self.usage = usage;
                true
            }
            CharacteristicAction::Use(_) => false,
        }
    }

    pub(crate) fn clear_usage(&mut self) {
        self.usage = None;
    }
}
