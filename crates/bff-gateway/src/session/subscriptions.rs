//! Per-session topic subscriptions.
//!
//! Each subscription is a bus subscription on a salted pattern, buffered in
//! a bounded [`Channel`](shared_bus::Channel) and stored under a numeric id
//! from the session's counter.
//!
//! ```text
//! subscribeToPeerMessages("foo")  ──►  bus.subscribe("<salt>.peer.*.foo")  ──► id 0
//! getPeerMessages(0)              ──►  stream of {payload, topic: "foo", sender}
//! unsubscribeToPeerMessages(0)    ──►  channel closed, stream ends
//! ```
//!
//! Dropping a message stream (cancel, connection close) releases its
//! subscription the same way `unsubscribe*` does.

use crate::domain::error::GatewayResult;
use crate::domain::types::{
    PeerTopicMessage, PublishToTopicRequest, PublishToTopicResult, SubscriptionRef,
    SubscriptionRequest, SubscriptionResult, SystemTopicMessage, UnsubscriptionResult,
};
use crate::rpc::services::TopicsService;
use crate::session::namespace::TopicNamespace;
use crate::session::state::{Session, SubscriptionKind};
use async_trait::async_trait;
use bff_telemetry::{TOPIC_MESSAGES_DROPPED, TOPIC_MESSAGES_PUBLISHED};
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use shared_bus::TopicBus;
use std::sync::Arc;
use tracing::{debug, warn};

/// Topics service of one session.
pub struct SubscriptionManager {
    session: Arc<Session>,
    bus: Arc<dyn TopicBus>,
    namespace: TopicNamespace,
    buffer: usize,
}

impl SubscriptionManager {
    pub fn new(
        session: Arc<Session>,
        bus: Arc<dyn TopicBus>,
        namespace: TopicNamespace,
        buffer: usize,
    ) -> Self {
        Self {
            session,
            bus,
            namespace,
            buffer,
        }
    }

    async fn subscribe(&self, kind: SubscriptionKind, topic: &str) -> GatewayResult<SubscriptionResult> {
        // Validate before an id is consumed
        let pattern = match kind {
            SubscriptionKind::Peer => self.namespace.peer_pattern(topic)?,
            SubscriptionKind::System => self.namespace.system_topic(topic)?,
        };
        let subscription_id = self.session.allocate_subscription_id();
        let subscription = self.bus.subscribe(&pattern, self.buffer).await?;
        self.session
            .insert_subscription(kind, subscription_id, subscription);

        debug!(
            peer = %self.session.address(),
            subscription_id,
            ?kind,
            pattern = %pattern,
            "Subscribed"
        );
        Ok(SubscriptionResult { subscription_id })
    }

    fn unsubscribe(&self, kind: SubscriptionKind, subscription_id: u32) -> UnsubscriptionResult {
        match self.session.remove_subscription(kind, subscription_id) {
            Some(subscription) => {
                subscription.unsubscribe();
                debug!(peer = %self.session.address(), subscription_id, ?kind, "Unsubscribed");
            }
            None => {
                debug!(
                    peer = %self.session.address(),
                    subscription_id,
                    ?kind,
                    "Unsubscribe of unknown subscription ignored"
                );
            }
        }
        UnsubscriptionResult { ok: true }
    }

    fn release_on_drop(&self, kind: SubscriptionKind, subscription_id: u32) -> ReleaseOnDrop {
        ReleaseOnDrop {
            session: Arc::clone(&self.session),
            kind,
            subscription_id,
        }
    }

    fn unknown_subscription<T: Send + 'static>(&self, kind: SubscriptionKind, subscription_id: u32) -> BoxStream<'static, T> {
        warn!(
            peer = %self.session.address(),
            subscription_id,
            ?kind,
            "Subscription not found, ending stream"
        );
        stream::empty().boxed()
    }
}

/// Detaches a subscription from the bus once its message stream is gone.
struct ReleaseOnDrop {
    session: Arc<Session>,
    kind: SubscriptionKind,
    subscription_id: u32,
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        if let Some(subscription) = self
            .session
            .remove_subscription(self.kind, self.subscription_id)
        {
            subscription.unsubscribe();
            debug!(
                peer = %self.session.address(),
                subscription_id = self.subscription_id,
                kind = ?self.kind,
                "Released subscription of dropped stream"
            );
        }
    }
}

#[async_trait]
impl TopicsService for SubscriptionManager {
    async fn publish_to_topic(&self, request: PublishToTopicRequest) -> GatewayResult<PublishToTopicResult> {
        let subject = self
            .namespace
            .peer_topic(self.session.address(), &request.topic)?;
        let delivery = self.bus.publish(&subject, Bytes::from(request.payload)).await?;

        TOPIC_MESSAGES_PUBLISHED.inc();
        if delivery.dropped > 0 {
            TOPIC_MESSAGES_DROPPED.inc_by(delivery.dropped as f64);
        }
        Ok(PublishToTopicResult { ok: true })
    }

    async fn subscribe_to_peer_messages(&self, request: SubscriptionRequest) -> GatewayResult<SubscriptionResult> {
        self.subscribe(SubscriptionKind::Peer, &request.topic).await
    }

    async fn subscribe_to_system_messages(&self, request: SubscriptionRequest) -> GatewayResult<SubscriptionResult> {
        self.subscribe(SubscriptionKind::System, &request.topic).await
    }

    fn get_peer_messages(&self, request: SubscriptionRef) -> BoxStream<'static, PeerTopicMessage> {
        let Some(channel) = self
            .session
            .subscription_channel(SubscriptionKind::Peer, request.subscription_id)
        else {
            return self.unknown_subscription(SubscriptionKind::Peer, request.subscription_id);
        };

        let release = self.release_on_drop(SubscriptionKind::Peer, request.subscription_id);
        let namespace = self.namespace.clone();
        channel
            .into_stream()
            .filter_map(move |message| {
                let _release = &release;
                let demangled = namespace
                    .demangle_peer(&message.subject)
                    .map(|(sender, topic)| PeerTopicMessage {
                        payload: message.payload.to_vec(),
                        topic: topic.to_string(),
                        sender: sender.to_string(),
                    });
                if demangled.is_none() {
                    warn!(subject = %message.subject, "Peer message outside the peer namespace");
                }
                futures::future::ready(demangled)
            })
            .boxed()
    }

    fn get_system_messages(&self, request: SubscriptionRef) -> BoxStream<'static, SystemTopicMessage> {
        let Some(channel) = self
            .session
            .subscription_channel(SubscriptionKind::System, request.subscription_id)
        else {
            return self.unknown_subscription(SubscriptionKind::System, request.subscription_id);
        };

        let release = self.release_on_drop(SubscriptionKind::System, request.subscription_id);
        let namespace = self.namespace.clone();
        channel
            .into_stream()
            .filter_map(move |message| {
                let _release = &release;
                let demangled =
                    namespace
                        .demangle_system(&message.subject)
                        .map(|topic| SystemTopicMessage {
                            payload: message.payload.to_vec(),
                            topic: topic.to_string(),
                        });
                futures::future::ready(demangled)
            })
            .boxed()
    }

    fn unsubscribe_to_peer_messages(&self, request: SubscriptionRef) -> UnsubscriptionResult {
        self.unsubscribe(SubscriptionKind::Peer, request.subscription_id)
    }

    fn unsubscribe_to_system_messages(&self, request: SubscriptionRef) -> UnsubscriptionResult {
        self.unsubscribe(SubscriptionKind::System, request.subscription_id)
    }
}
