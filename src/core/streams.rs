//! Stream adapters shared by the store and the live bindings.

use std::time::Duration;

use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use log::warn;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, UnboundedReceiverStream, WatchStream};

/// Items of a broadcast channel. Lagged receivers skip what they missed.
pub fn broadcast_stream<T>(receiver: broadcast::Receiver<T>) -> BoxStream<'static, T>
where
    T: Clone + Send + 'static,
{
    BroadcastStream::new(receiver)
        .filter_map(|item| async move {
            match item {
                Ok(item) => Some(item),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!("Stream lagged, skipped {} items", skipped);
                    None
                }
            }
        })
        .boxed()
}

/// Current value of a watch channel, then every change.
pub fn watch_stream<T>(receiver: watch::Receiver<T>) -> BoxStream<'static, T>
where
    T: Clone + Send + Sync + 'static,
{
    WatchStream::new(receiver).boxed()
}

pub fn receiver_stream<T: Send + 'static>(receiver: mpsc::UnboundedReceiver<T>) -> BoxStream<'static, T> {
    UnboundedReceiverStream::new(receiver).boxed()
}

struct Window<T> {
    source: Option<BoxStream<'static, T>>,
    ticker: Interval,
    pending: Vec<T>,
}

/// Collects items over fixed windows and emits each non-empty window as one
/// batch. Whatever is pending when the source ends is flushed.
pub fn by_window<T: Send + 'static>(
    source: BoxStream<'static, T>,
    window: Duration,
) -> BoxStream<'static, Vec<T>> {
    let mut ticker = interval_at(Instant::now() + window, window);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let state = Window { source: Some(source), ticker, pending: Vec::new() };

    stream::unfold(state, |mut state| async move {
        loop {
            let Some(source) = state.source.as_mut() else {
                if state.pending.is_empty() {
                    return None;
                }
                let batch = std::mem::take(&mut state.pending);
                return Some((batch, state));
            };
            tokio::select! {
                item = source.next() => match item {
                    Some(item) => state.pending.push(item),
                    None => state.source = None,
                },
                _ = state.ticker.tick() => {
                    if !state.pending.is_empty() {
                        let batch = std::mem::take(&mut state.pending);
                        return Some((batch, state));
                    }
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::central::discover::{DiscoverAction, DiscoverState};
    use crate::core::central::types::{DiscoveredPeripheral, PeripheralId};

    #[tokio::test(start_paused = true)]
    async fn burst_within_window_is_one_batch() {
        let (sender, receiver) = mpsc::unbounded_channel();
        for n in 0..37 {
            let id = n % 20;
            sender
                .send(DiscoveredPeripheral { id: PeripheralId::new(format!("p{id}")), name: None, rssi: -(n as i16) })
                .expect("receiver alive");
        }

        let mut batches = by_window(receiver_stream(receiver), Duration::from_millis(500));
        let started = Instant::now();
        let batch = batches.next().await.expect("one batch");
        assert_eq!(batch.len(), 37);
        assert!(started.elapsed() >= Duration::from_millis(500));

        let mut registry = DiscoverState::new();
        registry.reduce(DiscoverAction::Discovered(batch));
        assert_eq!(registry.peripherals().count(), 20);
        assert_eq!(registry.peripheral(&PeripheralId::new("p3")).map(|p| p.rssi), Some(-23));
        assert_eq!(registry.peripheral(&PeripheralId::new("p19")).map(|p| p.rssi), Some(-19));

        drop(sender);
        assert!(batches.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn separate_windows_produce_separate_batches() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut batches = by_window(receiver_stream(receiver), Duration::from_millis(500));

        sender.send(1).expect("receiver alive");
        assert_eq!(batches.next().await, Some(vec![1]));

        sender.send(2).expect("receiver alive");
        sender.send(3).expect("receiver alive");
        assert_eq!(batches.next().await, Some(vec![2, 3]));
    }

    #[tokio::test(start_paused = true)]
    async fn pending_items_flush_when_source_ends() {
        let source = stream::iter(vec![1, 2, 3]).boxed();
        let batches: Vec<Vec<i32>> = by_window(source, Duration::from_secs(10)).collect().await;
        assert_eq!(batches, vec![vec![1, 2, 3]]);
    }

    #[tokio::test]
    async fn watch_stream_starts_with_current_value() {
        let (sender, receiver) = watch::channel(false);
        let mut values = watch_stream(receiver);
        assert_eq!(values.next().await, Some(false));
        sender.send_replace(true);
        assert_eq!(values.next().await, Some(true));
        drop(sender);
        assert_eq!(values.next().await, None);
    }

    #[tokio::test]
    async fn broadcast_stream_ends_when_sender_drops() {
        let (sender, receiver) = broadcast::channel(4);
        let mut items = broadcast_stream(receiver);
        sender.send(5u8).expect("receiver alive");
        drop(sender);
        assert_eq!(items.next().await, Some(5));
        assert_eq!(items.next().await, None);
    }
}
