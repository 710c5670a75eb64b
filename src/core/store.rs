//! Single-writer runtime for the bridge reducer.
//!
//! One task owns the [`BridgeState`]. Actions are queued on an unbounded
//! channel and reduced one at a time; the resulting effects are executed
//! against the [`Providers`], and events from subscriptions re-enter the same
//! queue as actions. Observers read the state through a watch channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::bridge::{BridgeAction, BridgeState};
use crate::core::central::providers::{
    AuthorizationProvider, PeripheralDiscoverer, PeripheralManager, RadioStateProvider, RelayClient,
    Scanner, ServiceDiscoverer,
};
use crate::core::effect::{process, Call, CancelKey, Effect, Event, Source, Subscription};
use crate::core::publish::server::Server;
use crate::core::streams::by_window;

/// Everything the store talks to outside the reducers.
#[derive(Clone)]
pub struct Providers {
    pub radio: Arc<dyn RadioStateProvider>,
    pub authorization: Arc<dyn AuthorizationProvider>,
    pub scanner: Arc<dyn Scanner>,
    pub discoverer: Arc<dyn PeripheralDiscoverer>,
    pub peripherals: Arc<dyn PeripheralManager>,
    pub services: Arc<dyn ServiceDiscoverer>,
    pub relay: Arc<dyn RelayClient>,
    pub server: Arc<dyn Server>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Window over which discovered peripherals are batched.
    pub discovery_window: Duration,
    pub rssi_interval: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            discovery_window: Duration::from_millis(500),
            rssi_interval: Duration::from_secs(1),
        }
    }
}

/// Cancellation tokens of the running subscription groups.
pub struct SubscriptionRegistry {
    root: CancellationToken,
    groups: HashMap<CancelKey, CancellationToken>,
}

impl SubscriptionRegistry {
    pub fn new(root: CancellationToken) -> Self {
        Self { root, groups: HashMap::new() }
    }

    /// Registers a fresh group under `key`, cancelling the one it replaces.
    pub fn replace(&mut self, key: CancelKey) -> CancellationToken {
        let token = self.root.child_token();
        if let Some(previous) = self.groups.insert(key, token.clone()) {
            previous.cancel();
        }
        token
    }

    /// Returns whether a group was registered under `key`.
    pub fn cancel(&mut self, key: &CancelKey) -> bool {
        match self.groups.remove(key) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, token) in self.groups.drain() {
            token.cancel();
        }
    }

    pub fn contains(&self, key: &CancelKey) -> bool {
        self.groups.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Handle to a running store.
pub struct BridgeHandle {
    actions: mpsc::UnboundedSender<BridgeAction>,
    state: watch::Receiver<BridgeState>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl BridgeHandle {
    /// Queues an action. Returns false once the store has stopped.
    pub fn send(&self, action: BridgeAction) -> bool {
        self.actions.send(action).is_ok()
    }

    pub fn state(&self) -> watch::Receiver<BridgeState> {
        self.state.clone()
    }

    pub fn snapshot(&self) -> BridgeState {
        self.state.borrow().clone()
    }

    /// Stops the store and every subscription it started.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!("Bridge store task ended abnormally: {}", e);
        }
    }
}

/// Spawns the store task and queues [`BridgeAction::Setup`].
pub fn spawn(providers: Providers, timing: Timing, initial: BridgeState) -> BridgeHandle {
    let (actions, receiver) = mpsc::unbounded_channel();
    let (state_tx, state) = watch::channel(initial.clone());
    let shutdown = CancellationToken::new();

    let executor = Executor {
        providers,
        timing,
        actions: actions.clone(),
        registry: SubscriptionRegistry::new(shutdown.child_token()),
    };
    let task = tokio::spawn(run(initial, executor, receiver, state_tx, shutdown.clone()));

    // The receiver is alive until the task ends.
    let _ = actions.send(BridgeAction::Setup);
    BridgeHandle { actions, state, shutdown, task }
}

async fn run(
    mut state: BridgeState,
    mut executor: Executor,
    mut actions: mpsc::UnboundedReceiver<BridgeAction>,
    state_tx: watch::Sender<BridgeState>,
    shutdown: CancellationToken,
) {
    info!("Bridge store started");
    loop {
        let action = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            action = actions.recv() => match action {
                Some(action) => action,
                None => break,
            },
        };
        debug!("Action: {:?}", action);
        for effect in process(&mut state, action, BridgeState::reduce) {
            executor.execute(effect);
        }
        state_tx.send_replace(state.clone());
    }
    executor.registry.cancel_all();
    info!("Bridge store stopped");
}

struct Executor {
    providers: Providers,
    timing: Timing,
    actions: mpsc::UnboundedSender<BridgeAction>,
    registry: SubscriptionRegistry,
}

impl Executor {
    fn execute(&mut self, effect: Effect<BridgeAction>) {
        match effect {
            Effect::Send(action) => {
                let _ = self.actions.send(action);
            }
            Effect::Call(call) => self.call(call),
            Effect::Subscribe { key, subscriptions } => {
                debug!("Subscribing {:?}", key);
                let token = self.registry.replace(key);
                for subscription in subscriptions {
                    // Opened here so that ordering across groups follows effect order.
                    let events = self.open(&subscription.source, &token);
                    tokio::spawn(forward(events, subscription, token.clone(), self.actions.clone()));
                }
            }
            Effect::Cancel(key) => {
                if self.registry.cancel(&key) {
                    debug!("Cancelled {:?}", key);
                }
            }
        }
    }

    fn call(&self, call: Call) {
        let providers = &self.providers;
        match call {
            Call::StartScan => providers.scanner.start(),
            Call::StopScan => providers.scanner.stop(),
            Call::Connect(id) => providers.peripherals.connect(&id),
            Call::Disconnect(id) => providers.peripherals.disconnect(&id),
            Call::RelayWrite(data) => providers.relay.write(data),
            Call::RelayStop => providers.relay.stop(),
            Call::ServerSend(data) => providers.server.send(data),
            Call::ServerStop => providers.server.stop(),
        }
    }

    fn open(&self, source: &Source, token: &CancellationToken) -> BoxStream<'static, Event> {
        let providers = &self.providers;
        match source.clone() {
            Source::RadioState => providers.radio.power_events().map(Event::Power).boxed(),
            Source::Authorization => providers.authorization.authorization().map(Event::Authorization).boxed(),
            Source::Scanning => providers.scanner.is_scanning().map(Event::Scanning).boxed(),
            Source::Discovered => by_window(providers.discoverer.discovered(), self.timing.discovery_window)
                .map(Event::Discovered)
                .boxed(),
            Source::ConnectionState(id) => providers.peripherals.connection_state(&id).map(Event::Connected).boxed(),
            Source::Rssi(id) => providers
                .peripherals
                .rssi(&id, self.timing.rssi_interval)
                .map(Event::Rssi)
                .boxed(),
            Source::Services(id) => providers.services.services(&id).map(Event::Services).boxed(),
            Source::IncludedServices(key) => providers.services.included_services(&key).map(Event::Services).boxed(),
            Source::Characteristics(key) => {
                providers.services.characteristics(&key).map(Event::Characteristics).boxed()
            }
            Source::RelayStart(target) => providers.relay.start(&target).map(|()| Event::RelayAck).boxed(),
            Source::RelayOutput => providers.relay.output().map(Event::RelayRead).boxed(),
            Source::ServerStart { transport, port } => {
                let server = providers.server.clone();
                let cancel = token.clone();
                stream::once(async move { server.start(transport, port, cancel).await })
                    .flat_map(|started| match started {
                        Ok(inbound) => stream::iter([Event::ServerStarted])
                            .chain(inbound.map(Event::ServerReceived))
                            .boxed(),
                        Err(e) => stream::iter([Event::ServerStartFailed(e.to_string())]).boxed(),
                    })
                    .boxed()
            }
        }
    }
}

/// Maps a subscription's events to actions until the group is cancelled or
/// the source ends.
async fn forward(
    mut events: BoxStream<'static, Event>,
    subscription: Subscription<BridgeAction>,
    token: CancellationToken,
    actions: mpsc::UnboundedSender<BridgeAction>,
) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            event = events.next() => match event {
                Some(event) => {
                    if let Some(action) = subscription.action_for(event) {
                        if actions.send(action).is_err() {
                            break;
                        }
                    }
                }
                None => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::central::types::PeripheralId;
    use crate::core::effect::Purpose;

    #[test]
    fn replacing_a_group_cancels_the_previous_token() {
        let mut registry = SubscriptionRegistry::new(CancellationToken::new());
        let key = CancelKey::peripheral(&PeripheralId::new("a"), Purpose::Connection);

        let first = registry.replace(key.clone());
        let second = registry.replace(key.clone());

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn cancel_removes_only_the_named_group() {
        let mut registry = SubscriptionRegistry::new(CancellationToken::new());
        let scanning = registry.replace(CancelKey::central(Purpose::Scanning));
        let radio = registry.replace(CancelKey::central(Purpose::Radio));

        assert!(registry.cancel(&CancelKey::central(Purpose::Scanning)));
        assert!(!registry.cancel(&CancelKey::central(Purpose::Scanning)));
        assert!(scanning.is_cancelled());
        assert!(!radio.is_cancelled());
        assert!(registry.contains(&CancelKey::central(Purpose::Radio)));
    }

    #[test]
    fn root_cancellation_reaches_every_group() {
        let root = CancellationToken::new();
        let mut registry = SubscriptionRegistry::new(root.clone());
        let a = registry.replace(CancelKey::central(Purpose::Radio));
        let b = registry.replace(CancelKey::central(Purpose::Server));
        root.cancel();
        assert!(a.is_cancelled() && b.is_cancelled());
    }

    #[tokio::test]
    async fn forward_stops_at_cancellation() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let subscription = Subscription::new(Source::Scanning, |event| match event {
            Event::Scanning(_) => Some(BridgeAction::Setup),
            _ => None,
        });
        token.cancel();
        forward(stream::iter([Event::Scanning(true)]).boxed(), subscription, token, sender).await;
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn forward_drops_unmapped_events() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let subscription = Subscription::new(Source::Scanning, |event| match event {
            Event::Scanning(true) => Some(BridgeAction::Setup),
            _ => None,
        });
        let events = stream::iter([Event::Scanning(false), Event::Rssi(-3), Event::Scanning(true)]).boxed();
        forward(events, subscription, CancellationToken::new(), sender).await;
        assert_eq!(receiver.recv().await, Some(BridgeAction::Setup));
        assert_eq!(receiver.recv().await, None);
    }
}
