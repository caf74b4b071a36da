//! # Topic Bus
//!
//! Port over a publish/subscribe broker plus the in-process implementation.
//!
//! Delivery is at-most-once: no acknowledgements, no persistence, no replay.
//! Per-subscriber order on one subject follows publish order.

use crate::channel::{Channel, PushOutcome};
use crate::topic::{self, TopicError, TopicPattern};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from bus operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The topic or pattern failed validation; nothing reached the broker.
    #[error("invalid topic: {0}")]
    InvalidTopic(#[from] TopicError),

    /// The bus has been shut down.
    #[error("message bus closed")]
    Closed,

    /// The underlying broker rejected the operation.
    #[error("broker error: {0}")]
    Broker(String),
}

/// A message as delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Concrete subject the message was published on.
    pub subject: String,
    /// Opaque payload.
    pub payload: Bytes,
}

/// Local fan-out result of a publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Subscribers that queued the message.
    pub delivered: usize,
    /// Subscribers whose buffer was full.
    pub dropped: usize,
}

/// Publish/subscribe operations over string topics.
#[async_trait]
pub trait TopicBus: Send + Sync {
    /// Publish `payload` on `topic`. Fire-and-forget.
    ///
    /// Topics failing validation are rejected before touching the broker.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<Delivery, BusError>;

    /// Subscribe to every subject matching `pattern`.
    ///
    /// Messages are delivered into a bounded channel of `capacity` items;
    /// overflow is dropped and never blocks the publisher.
    async fn subscribe(&self, pattern: &str, capacity: usize) -> Result<BusSubscription, BusError>;
}

type Release = Box<dyn FnOnce() + Send>;

/// Handle on an active subscription.
///
/// Dropping the handle unsubscribes.
pub struct BusSubscription {
    id: u64,
    pattern: String,
    channel: Channel<BusMessage>,
    release: Mutex<Option<Release>>,
}

impl BusSubscription {
    /// Wrap a delivery channel and the hook that detaches it from the broker.
    pub fn new(
        id: u64,
        pattern: impl Into<String>,
        channel: Channel<BusMessage>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            id,
            pattern: pattern.into(),
            channel,
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    /// Broker-side subscription id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Pattern this subscription was created with.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The delivery channel.
    #[must_use]
    pub fn channel(&self) -> &Channel<BusMessage> {
        &self.channel
    }

    /// Whether the subscription is still attached to the broker.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.release.lock().is_some()
    }

    /// Detach from the broker and close the channel. Repeated calls are no-ops.
    pub fn unsubscribe(&self) {
        let release = self.release.lock().take();
        if let Some(release) = release {
            release();
            debug!(subscription = self.id, pattern = %self.pattern, "Unsubscribed");
        }
        self.channel.close();
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for BusSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusSubscription")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .field("active", &self.is_active())
            .finish()
    }
}

struct Subscriber {
    pattern: TopicPattern,
    channel: Channel<BusMessage>,
}

#[derive(Default)]
struct BusState {
    subscribers: RwLock<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
}

/// In-process broker.
///
/// Suitable for a single node and for tests; a clustered deployment would
/// put an external broker adapter behind the same trait.
#[derive(Clone, Default)]
pub struct InMemoryTopicBus {
    state: Arc<BusState>,
}

impl InMemoryTopicBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attached subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state.subscribers.read().len()
    }

    /// Total messages accepted by [`TopicBus::publish`].
    #[must_use]
    pub fn messages_published(&self) -> u64 {
        self.state.published.load(Ordering::Relaxed)
    }

    /// Total deliveries discarded because a subscriber buffer was full.
    #[must_use]
    pub fn messages_dropped(&self) -> u64 {
        self.state.dropped.load(Ordering::Relaxed)
    }

    fn detach(state: &Weak<BusState>, id: u64) {
        if let Some(state) = state.upgrade() {
            state.subscribers.write().remove(&id);
        }
    }
}

#[async_trait]
impl TopicBus for InMemoryTopicBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<Delivery, BusError> {
        topic::validate(topic)?;
        self.state.published.fetch_add(1, Ordering::Relaxed);

        let subscribers = self.state.subscribers.read();
        let mut delivery = Delivery::default();
        for (id, subscriber) in subscribers.iter() {
            if !subscriber.pattern.matches(topic) {
                continue;
            }
            let message = BusMessage {
                subject: topic.to_string(),
                payload: payload.clone(),
            };
            match subscriber.channel.push(message) {
                PushOutcome::Delivered => delivery.delivered += 1,
                PushOutcome::Dropped => {
                    delivery.dropped += 1;
                    self.state.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        subscription = id,
                        pattern = %subscriber.pattern,
                        topic = topic,
                        capacity = subscriber.channel.capacity(),
                        "Subscriber buffer full, message dropped"
                    );
                }
                PushOutcome::Closed => {}
            }
        }

        debug!(
            topic = topic,
            receivers = delivery.delivered,
            dropped = delivery.dropped,
            "Message published"
        );
        Ok(delivery)
    }

    async fn subscribe(&self, pattern: &str, capacity: usize) -> Result<BusSubscription, BusError> {
        let parsed = TopicPattern::parse(pattern)?;
        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        let channel = Channel::bounded(capacity);

        self.state.subscribers.write().insert(
            id,
            Subscriber {
                pattern: parsed,
                channel: channel.clone(),
            },
        );
        debug!(subscription = id, pattern = pattern, "Subscription created");

        let state = Arc::downgrade(&self.state);
        Ok(BusSubscription::new(id, pattern, channel, move || {
            InMemoryTopicBus::detach(&state, id)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_publish_no_subscribers() {
        let bus = InMemoryTopicBus::new();
        let delivery = bus.publish("a.b", Bytes::from_static(b"x")).await.unwrap();
        assert_eq!(delivery, Delivery::default());
        assert_eq!(bus.messages_published(), 1);
    }

    #[tokio::test]
    async fn test_invalid_topic_rejected_before_publish() {
        let bus = InMemoryTopicBus::new();
        let result = bus.publish("a..b", Bytes::new()).await;
        assert!(matches!(result, Err(BusError::InvalidTopic(_))));
        assert_eq!(bus.messages_published(), 0);
    }

    #[tokio::test]
    async fn test_invalid_pattern_rejected() {
        let bus = InMemoryTopicBus::new();
        let result = bus.subscribe("a.*.", 4).await;
        assert!(matches!(result, Err(BusError::InvalidTopic(_))));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscription_receives_matching_subjects() {
        let bus = InMemoryTopicBus::new();
        let sub = bus.subscribe("salt.peer.*.foo", 8).await.unwrap();

        bus.publish("salt.peer.0xa.foo", Bytes::from_static(b"1")).await.unwrap();
        bus.publish("salt.peer.0xa.bar", Bytes::from_static(b"2")).await.unwrap();
        bus.publish("salt.foo", Bytes::from_static(b"3")).await.unwrap();

        let message = timeout(Duration::from_millis(100), sub.channel().recv())
            .await
            .expect("timeout")
            .expect("message");
        assert_eq!(message.subject, "salt.peer.0xa.foo");
        assert_eq!(message.payload, Bytes::from_static(b"1"));
        assert!(sub.channel().try_recv().is_none());
    }

    #[tokio::test]
    async fn test_overflow_is_dropped_not_blocking() {
        let bus = InMemoryTopicBus::new();
        let sub = bus.subscribe("t", 2).await.unwrap();

        for i in 0..4u8 {
            bus.publish("t", Bytes::from(vec![i])).await.unwrap();
        }
        let last = bus.publish("t", Bytes::from(vec![4])).await.unwrap();
        assert_eq!(last, Delivery { delivered: 0, dropped: 1 });

        assert_eq!(sub.channel().len(), 2);
        assert_eq!(bus.messages_dropped(), 3);
        assert_eq!(sub.channel().try_recv().unwrap().payload, Bytes::from(vec![0]));
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let bus = InMemoryTopicBus::new();
        let sub = bus.subscribe("t", 2).await.unwrap();
        assert_eq!(bus.subscriber_count(), 1);

        sub.unsubscribe();
        sub.unsubscribe();

        assert!(!sub.is_active());
        assert!(sub.channel().is_closed());
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish("t", Bytes::new()).await.unwrap().delivered, 0);
    }

    #[tokio::test]
    async fn test_drop_detaches_subscription() {
        let bus = InMemoryTopicBus::new();
        {
            let _a = bus.subscribe("t", 2).await.unwrap();
            let _b = bus.subscribe("t", 2).await.unwrap();
            assert_eq!(bus.subscriber_count(), 2);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }
}
