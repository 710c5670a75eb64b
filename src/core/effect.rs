//! Effect values returned by reducers.
//! A reducer mutates its state synchronously and describes every side effect
//! as data; the store executes them against the live providers.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::core::central::adapter::PowerEvent;
use crate::core::central::authorization::AuthorizationState;
use crate::core::central::types::{
    DiscoveredCharacteristic, DiscoveredPeripheral, DiscoveredService, PeripheralId, RelayTarget,
    ServiceKey,
};
use crate::core::publish::server::Transport;

/// Which entity a long-lived subscription belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityId {
    Central,
    Peripheral(PeripheralId),
    Service(ServiceKey),
}

/// What a long-lived subscription is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    Radio,
    Authorization,
    Scanning,
    Discovery,
    Activation,
    Connection,
    CharacteristicDiscovery,
    IncludedServiceDiscovery,
    DataInput,
    DataOutput,
    Server,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CancelKey {
    pub entity: EntityId,
    pub purpose: Purpose,
}

impl CancelKey {
    pub fn central(purpose: Purpose) -> Self {
        Self { entity: EntityId::Central, purpose }
    }

    pub fn peripheral(id: &PeripheralId, purpose: Purpose) -> Self {
        Self { entity: EntityId::Peripheral(id.clone()), purpose }
    }

    pub fn service(key: &ServiceKey, purpose: Purpose) -> Self {
        Self { entity: EntityId::Service(key.clone()), purpose }
    }
}

/// Fire-and-forget provider calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StartScan,
    StopScan,
    Connect(PeripheralId),
    Disconnect(PeripheralId),
    RelayWrite(Vec<u8>),
    RelayStop,
    ServerSend(Vec<u8>),
    ServerStop,
}

/// External event streams a subscription can follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    RadioState,
    Authorization,
    Scanning,
    /// Batched over the discovery window by the store.
    Discovered,
    ConnectionState(PeripheralId),
    /// Polled at the RSSI interval by the store.
    Rssi(PeripheralId),
    Services(PeripheralId),
    IncludedServices(ServiceKey),
    Characteristics(ServiceKey),
    RelayStart(RelayTarget),
    RelayOutput,
    ServerStart { transport: Transport, port: u16 },
}

/// Items produced by a [`Source`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Power(PowerEvent),
    Authorization(AuthorizationState),
    Scanning(bool),
    Discovered(Vec<DiscoveredPeripheral>),
    Connected(bool),
    Rssi(i16),
    Services(Vec<DiscoveredService>),
    Characteristics(Vec<DiscoveredCharacteristic>),
    RelayAck,
    RelayRead(Vec<u8>),
    ServerStarted,
    ServerStartFailed(String),
    ServerReceived(Vec<u8>),
}

type EventMapper<A> = Arc<dyn Fn(Event) -> Option<A> + Send + Sync>;

/// A source together with the translation of its events into actions.
pub struct Subscription<A> {
    pub source: Source,
    map: EventMapper<A>,
}

impl<A: 'static> Subscription<A> {
    pub fn new(source: Source, map: impl Fn(Event) -> Option<A> + Send + Sync + 'static) -> Self {
        Self { source, map: Arc::new(map) }
    }

    /// Translates an event; events of another kind are ignored.
    pub fn action_for(&self, event: Event) -> Option<A> {
        (self.map)(event)
    }

    fn lift<B: 'static>(self, f: Arc<dyn Fn(A) -> B + Send + Sync>) -> Subscription<B> {
        let inner = self.map;
        Subscription {
            source: self.source,
            map: Arc::new(move |event| inner(event).map(|action| f(action))),
        }
    }
}

impl<A> fmt::Debug for Subscription<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("source", &self.source).finish()
    }
}

#[derive(Debug)]
pub enum Effect<A> {
    /// Feed an action back into the same reducer.
    Send(A),
    Call(Call),
    /// Start a group of subscriptions, replacing any group under `key`.
    Subscribe { key: CancelKey, subscriptions: Vec<Subscription<A>> },
    Cancel(CancelKey),
}

#[derive(Debug)]
pub struct Effects<A>(Vec<Effect<A>>);

impl<A> Default for Effects<A> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<A: 'static> Effects<A> {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn send(action: A) -> Self {
        Self(vec![Effect::Send(action)])
    }

    pub fn call(call: Call) -> Self {
        Self(vec![Effect::Call(call)])
    }

    pub fn subscribe(key: CancelKey, subscriptions: Vec<Subscription<A>>) -> Self {
        Self(vec![Effect::Subscribe { key, subscriptions }])
    }

    pub fn cancel(key: CancelKey) -> Self {
        Self(vec![Effect::Cancel(key)])
    }

    pub fn push(&mut self, effect: Effect<A>) {
        self.0.push(effect);
    }

    pub fn extend(&mut self, other: Effects<A>) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Effect<A>> {
        self.0.iter()
    }

    /// Lifts a child's effects into the parent's action type.
    pub fn map<B: 'static>(self, f: impl Fn(A) -> B + Send + Sync + 'static) -> Effects<B> {
        let f: Arc<dyn Fn(A) -> B + Send + Sync> = Arc::new(f);
        Effects(
            self.0
                .into_iter()
                .map(|effect| match effect {
                    Effect::Send(action) => Effect::Send(f(action)),
                    Effect::Call(call) => Effect::Call(call),
                    Effect::Subscribe { key, subscriptions } => Effect::Subscribe {
                        key,
                        subscriptions: subscriptions
                            .into_iter()
                            .map(|subscription| subscription.lift(f.clone()))
                            .collect(),
                    },
                    Effect::Cancel(key) => Effect::Cancel(key),
                })
                .collect(),
        )
    }

    pub fn calls(&self) -> Vec<&Call> {
        self.0
            .iter()
            .filter_map(|effect| match effect {
                Effect::Call(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    pub fn cancelled_keys(&self) -> Vec<&CancelKey> {
        self.0
            .iter()
            .filter_map(|effect| match effect {
                Effect::Cancel(key) => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn subscribed_keys(&self) -> Vec<&CancelKey> {
        self.0
            .iter()
            .filter_map(|effect| match effect {
                Effect::Subscribe { key, .. } => Some(key),
                _ => None,
            })
            .collect()
    }

    /// Subscriptions started under `key`, if any.
    pub fn subscriptions(&self, key: &CancelKey) -> Option<&[Subscription<A>]> {
        self.0.iter().find_map(|effect| match effect {
            Effect::Subscribe { key: k, subscriptions } if k == key => Some(subscriptions.as_slice()),
            _ => None,
        })
    }
}

impl<A> IntoIterator for Effects<A> {
    type Item = Effect<A>;
    type IntoIter = std::vec::IntoIter<Effect<A>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<A> From<Effect<A>> for Effects<A> {
    fn from(effect: Effect<A>) -> Self {
        Self(vec![effect])
    }
}

/// Runs `reduce` until no `Send` effects remain, in FIFO order, and returns
/// the external effects in the order they were produced.
pub fn process<S, A: 'static>(
    state: &mut S,
    action: A,
    reduce: impl Fn(&mut S, A) -> Effects<A>,
) -> Effects<A> {
    let mut pending = VecDeque::from([action]);
    let mut external = Effects::none();
    while let Some(action) = pending.pop_front() {
        for effect in reduce(state, action) {
            match effect {
                Effect::Send(next) => pending.push_back(next),
                other => external.push(other),
            }
        }
    }
    external
}
