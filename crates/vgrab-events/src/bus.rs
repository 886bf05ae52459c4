//! Event bus with ring-buffer replay and bounded subscribers.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::debug;

use crate::event::Event;

/// Default replay buffer capacity.
pub const DEFAULT_BUFFER_SIZE: usize = 100;

/// Per-subscriber channel capacity.
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

struct BusInner {
    subscribers: HashMap<u64, mpsc::Sender<Event>>,
    buffer: VecDeque<Event>,
}

/// In-process publish/subscribe bus.
///
/// `publish` never blocks: each subscriber has a bounded channel. When a
/// subscriber's channel is full, progress events are dropped for that
/// subscriber; a non-progress event that cannot be delivered evicts the
/// subscriber (it can no longer keep up and would otherwise lose state
/// events silently).
pub struct EventBus {
    inner: Mutex<BusInner>,
    buffer_size: usize,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create a bus with the default replay buffer size.
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Create a bus with a custom replay buffer size.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            inner: Mutex::new(BusInner {
                subscribers: HashMap::new(),
                buffer: VecDeque::with_capacity(buffer_size),
            }),
            buffer_size,
            next_id: AtomicU64::new(0),
        }
    }

    /// Subscribe, receiving the buffered history followed by live events.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.inner.lock().expect("bus lock poisoned");
        // Replay fits within the channel capacity by construction
        // (buffer_size <= capacity is not enforced; excess replay is dropped).
        for event in inner.buffer.iter() {
            if tx.try_send(event.clone()).is_err() {
                break;
            }
        }
        inner.subscribers.insert(id, tx);
        debug!(subscriber = id, "event bus subscriber added");

        Subscription { id, rx }
    }

    /// Remove a subscriber.
    pub fn unsubscribe(&self, id: u64) {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        if inner.subscribers.remove(&id).is_some() {
            debug!(subscriber = id, "event bus subscriber removed");
        }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: Event) {
        let mut inner = self.inner.lock().expect("bus lock poisoned");

        if !event.kind.is_progress() {
            if inner.buffer.len() >= self.buffer_size {
                inner.buffer.pop_front();
            }
            inner.buffer.push_back(event.clone());
        }

        let mut evicted = Vec::new();
        for (&id, tx) in inner.subscribers.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) if event.kind.is_progress() => {
                    // Drop progress for slow subscribers.
                }
                Err(_) => evicted.push(id),
            }
        }
        for id in evicted {
            inner.subscribers.remove(&id);
            debug!(subscriber = id, "event bus subscriber evicted");
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().expect("bus lock poisoned").subscribers.len()
    }

    /// Number of buffered events.
    pub fn buffered(&self) -> usize {
        self.inner.lock().expect("bus lock poisoned").buffer.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for one subscriber; dropping it does not unsubscribe (the bus
/// evicts on the next failed delivery), so callers should unsubscribe
/// explicitly when the stream ends.
pub struct Subscription {
    /// Subscriber ID, for `EventBus::unsubscribe`
    pub id: u64,
    /// Live event receiver
    pub rx: mpsc::Receiver<Event>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, LogLevel};

    #[tokio::test]
    async fn test_subscriber_receives_published_events() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        bus.publish(Event::log(LogLevel::Info, "hello"));

        let event = sub.rx.recv().await.unwrap();
        assert_eq!(event.message, "hello");
        assert_eq!(event.kind, EventKind::Log);
    }

    #[tokio::test]
    async fn test_replay_on_subscribe() {
        let bus = EventBus::new();
        bus.publish(Event::log(LogLevel::Info, "first"));
        bus.publish(Event::log(LogLevel::Info, "second"));

        let mut sub = bus.subscribe();
        assert_eq!(sub.rx.recv().await.unwrap().message, "first");
        assert_eq!(sub.rx.recv().await.unwrap().message, "second");
    }

    #[tokio::test]
    async fn test_progress_events_not_replayed() {
        let bus = EventBus::new();
        bus.publish(Event::new(EventKind::UploadProgress, "50%"));
        bus.publish(Event::log(LogLevel::Info, "state"));

        let mut sub = bus.subscribe();
        assert_eq!(sub.rx.recv().await.unwrap().message, "state");
        assert!(sub.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ring_buffer_drops_oldest() {
        let bus = EventBus::with_buffer_size(2);
        bus.publish(Event::log(LogLevel::Info, "a"));
        bus.publish(Event::log(LogLevel::Info, "b"));
        bus.publish(Event::log(LogLevel::Info, "c"));
        assert_eq!(bus.buffered(), 2);

        let mut sub = bus.subscribe();
        assert_eq!(sub.rx.recv().await.unwrap().message, "b");
        assert_eq!(sub.rx.recv().await.unwrap().message, "c");
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_subscriber() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        bus.unsubscribe(sub.id);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
