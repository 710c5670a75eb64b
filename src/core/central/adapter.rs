//! Root BLE adapter machine. Follows the radio power state, gates discovery
//! on authorization and tears discovery down whenever the radio leaves the
//! powered-on state.

use log::{info, warn};
use serde::Serialize;

use crate::core::central::authorization::{AuthorizationAction, AuthorizationState};
use crate::core::central::discover::{DiscoverAction, DiscoverState};
use crate::core::effect::{CancelKey, Effects, Event, Purpose, Source, Subscription};

/// Radio state as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PowerEvent {
    Resetting,
    Unsupported,
    PoweredOff,
    PoweredOn,
    Unauthorized,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum AdapterState {
    #[default]
    Initial,
    Resetting,
    Unsupported,
    PoweredOff,
    PoweredOn,
    Authorization(AuthorizationState),
    Discover(DiscoverState),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CentralAction {
    Setup,
    PowerUpdate(PowerEvent),
    Authorization(AuthorizationAction),
    Discover(DiscoverAction),
}

impl AdapterState {
    pub fn discover(&self) -> Option<&DiscoverState> {
        match self {
            AdapterState::Discover(state) => Some(state),
            _ => None,
        }
    }

    pub fn is_discovering(&self) -> bool {
        matches!(self, AdapterState::Discover(_))
    }

    pub fn reduce(&mut self, action: CentralAction) -> Effects<CentralAction> {
        match action {
            CentralAction::Setup => match self {
                AdapterState::Initial => Effects::subscribe(
                    CancelKey::central(Purpose::Radio),
                    vec![Subscription::new(Source::RadioState, |event| match event {
                        Event::Power(power) => Some(CentralAction::PowerUpdate(power)),
                        _ => None,
                    })],
                ),
                AdapterState::Authorization(AuthorizationState::NotDetermined) => {
                    Effects::send(CentralAction::Authorization(AuthorizationAction::Request))
                }
                _ => Effects::none(),
            },
            CentralAction::PowerUpdate(power) => self.power_update(power),
            CentralAction::Authorization(action) => {
                let AdapterState::Authorization(authorization) = self else {
                    return Effects::none();
                };
                let allowed = action == AuthorizationAction::Update(AuthorizationState::AllowedAlways);
                let mut effects = authorization.reduce(action).map(CentralAction::Authorization);
                if allowed {
                    info!("Bluetooth authorized, entering discovery");
                    *self = AdapterState::Discover(DiscoverState::new());
                    effects.extend(Effects::send(CentralAction::Discover(DiscoverAction::Setup)));
                }
                effects
            }
            CentralAction::Discover(action) => match self {
                AdapterState::Discover(discover) => discover.reduce(action).map(CentralAction::Discover),
                _ => Effects::none(),
            },
        }
    }

    fn power_update(&mut self, power: PowerEvent) -> Effects<CentralAction> {
        let next = match power {
            PowerEvent::PoweredOn if matches!(self, AdapterState::Authorization(_) | AdapterState::Discover(_)) => {
                return Effects::none();
            }
            PowerEvent::PoweredOn => AdapterState::Authorization(AuthorizationState::NotDetermined),
            PowerEvent::Unauthorized => AdapterState::Authorization(AuthorizationState::Denied),
            PowerEvent::Resetting => AdapterState::Resetting,
            PowerEvent::Unsupported => AdapterState::Unsupported,
            PowerEvent::PoweredOff => AdapterState::PoweredOff,
        };
        info!("Bluetooth radio: {:?}", power);
        if power == PowerEvent::Unsupported {
            warn!("Bluetooth LE is not supported on this host");
        }

        let mut effects = match self {
            AdapterState::Discover(discover) => discover.teardown().map(CentralAction::Discover),
            _ => Effects::none(),
        };
        *self = next;
        if power == PowerEvent::PoweredOn {
            effects.extend(Effects::send(CentralAction::Setup));
        }
        effects
    }
}
