//! Peripheral scan machine, gated by the adapter being in discovery.

use log::debug;
use serde::Serialize;

use crate::core::effect::{Call, CancelKey, Effects, Event, Purpose, Source, Subscription};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ScanState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanAction {
    Setup,
    Start,
    Started,
    Stop,
    Stopped,
}

impl ScanState {
    pub fn reduce(&mut self, action: ScanAction) -> Effects<ScanAction> {
        match action {
            ScanAction::Setup => Effects::subscribe(
                CancelKey::central(Purpose::Scanning),
                vec![Subscription::new(Source::Scanning, |event| match event {
                    Event::Scanning(true) => Some(ScanAction::Started),
                    Event::Scanning(false) => Some(ScanAction::Stopped),
                    _ => None,
                })],
            ),
            ScanAction::Start if *self == ScanState::Idle => {
                *self = ScanState::Starting;
                Effects::call(Call::StartScan)
            }
            ScanAction::Stop if *self == ScanState::Running => {
                *self = ScanState::Stopping;
                Effects::call(Call::StopScan)
            }
            ScanAction::Started => {
                *self = ScanState::Running;
                Effects::none()
            }
            ScanAction::Stopped if *self != ScanState::Idle => {
                *self = ScanState::Idle;
                Effects::none()
            }
            other => {
                debug!("Scan {:?} ignored while {:?}", other, self);
                Effects::none()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_is_noop_unless_idle() {
        let mut state = ScanState::Idle;
        assert_eq!(state.reduce(ScanAction::Start).calls(), vec![&Call::StartScan]);
        assert_eq!(state, ScanState::Starting);

        assert!(state.reduce(ScanAction::Start).is_empty());
        assert_eq!(state, ScanState::Starting);

        state.reduce(ScanAction::Started);
        assert!(state.reduce(ScanAction::Start).is_empty());
        assert_eq!(state, ScanState::Running);
    }

    #[test]
    fn stop_is_noop_unless_running() {
        let mut state = ScanState::Idle;
        assert!(state.reduce(ScanAction::Stop).is_empty());
        assert_eq!(state, ScanState::Idle);

        let mut starting = ScanState::Starting;
        assert!(starting.reduce(ScanAction::Stop).is_empty());
        assert_eq!(starting, ScanState::Starting);
    }

    #[test]
    fn full_cycle_is_sequential() {
        let mut state = ScanState::Idle;
        let mut seen = vec![state];
        for action in [ScanAction::Start, ScanAction::Started, ScanAction::Stop, ScanAction::Stopped] {
            state.reduce(action);
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                ScanState::Idle,
                ScanState::Starting,
                ScanState::Running,
                ScanState::Stopping,
                ScanState::Idle,
            ]
        );
    }

    #[test]
    fn setup_maps_scanner_flag() {
        let mut state = ScanState::Idle;
        let effects = state.reduce(ScanAction::Setup);
        let subscriptions = effects
            .subscriptions(&CancelKey::central(Purpose::Scanning))
            .expect("scanning subscription");
        assert_eq!(subscriptions[0].source, Source::Scanning);
        assert_eq!(subscriptions[0].action_for(Event::Scanning(true)), Some(ScanAction::Started));
        assert_eq!(subscriptions[0].action_for(Event::Scanning(false)), Some(ScanAction::Stopped));
    }
}
