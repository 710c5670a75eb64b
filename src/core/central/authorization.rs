//! Bluetooth authorization machine.

use log::debug;
use serde::Serialize;

use crate::core::effect::{CancelKey, Effects, Event, Purpose, Source, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthorizationState {
    NotDetermined,
    AllowedAlways,
    Denied,
    Restricted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationAction {
    Request,
    Update(AuthorizationState),
}

impl AuthorizationState {
    pub fn reduce(&mut self, action: AuthorizationAction) -> Effects<AuthorizationAction> {
        match action {
            AuthorizationAction::Request if *self == AuthorizationState::NotDetermined => {
                Effects::subscribe(
                    CancelKey::central(Purpose::Authorization),
                    vec![Subscription::new(Source::Authorization, |event| match event {
                        Event::Authorization(value) => Some(AuthorizationAction::Update(value)),
                        _ => None,
                    })],
                )
            }
            AuthorizationAction::Request => {
                debug!("Authorization already determined ({:?}), ignoring request", self);
                Effects::none()
            }
            AuthorizationAction::Update(value) => {
                *self = value;
                Effects::none()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_subscribes_only_when_not_determined() {
        let mut state = AuthorizationState::NotDetermined;
        let effects = state.reduce(AuthorizationAction::Request);
        assert_eq!(
            effects.subscribed_keys(),
            vec![&CancelKey::central(Purpose::Authorization)]
        );

        let mut denied = AuthorizationState::Denied;
        assert!(denied.reduce(AuthorizationAction::Request).is_empty());
    }

    #[test]
    fn update_overwrites_state() {
        let mut state = AuthorizationState::NotDetermined;
        state.reduce(AuthorizationAction::Update(AuthorizationState::Restricted));
        assert_eq!(state, AuthorizationState::Restricted);
        state.reduce(AuthorizationAction::Update(AuthorizationState::AllowedAlways));
        assert_eq!(state, AuthorizationState::AllowedAlways);
    }
}
