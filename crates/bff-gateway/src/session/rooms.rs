//! Room broadcast on top of the topic bus.

use crate::domain::error::GatewayResult;
use crate::domain::types::{PublishToTopicResult, RoomMessage, RoomPublishRequest, RoomRequest};
use crate::rpc::services::RoomService;
use crate::session::namespace::TopicNamespace;
use crate::session::state::Session;
use async_trait::async_trait;
use bff_telemetry::{TOPIC_MESSAGES_DROPPED, TOPIC_MESSAGES_PUBLISHED};
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use shared_bus::TopicBus;
use std::sync::Arc;
use tracing::debug;

/// Room service of one session.
pub struct RoomChannel {
    session: Arc<Session>,
    bus: Arc<dyn TopicBus>,
    namespace: TopicNamespace,
    buffer: usize,
}

impl RoomChannel {
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
}

#[async_trait]
impl RoomService for RoomChannel {
    async fn publish_message_to_room(&self, request: RoomPublishRequest) -> GatewayResult<PublishToTopicResult> {
        let subject = self
            .namespace
            .room_topic(&request.room, self.session.address())?;
        let delivery = self.bus.publish(&subject, Bytes::from(request.payload)).await?;

        TOPIC_MESSAGES_PUBLISHED.inc();
        if delivery.dropped > 0 {
            TOPIC_MESSAGES_DROPPED.inc_by(delivery.dropped as f64);
        }
        Ok(PublishToTopicResult { ok: true })
    }

    async fn get_room_messages(&self, request: RoomRequest) -> GatewayResult<BoxStream<'static, RoomMessage>> {
        let pattern = self.namespace.room_pattern(&request.room)?;
        let subscription = self.bus.subscribe(&pattern, self.buffer).await?;
        debug!(peer = %self.session.address(), room = %request.room, "Joined room stream");

        let namespace = self.namespace.clone();
        let channel = subscription.channel().clone();
        // The subscription lives as long as the stream
        let stream = channel
            .into_stream()
            .filter_map(move |message| {
                let _attached = &subscription;
                let decoded = namespace
                    .demangle_room(&message.subject)
                    .map(|(room, sender)| RoomMessage {
                        room: room.to_string(),
                        sender: sender.to_string(),
                        payload: message.payload.to_vec(),
                    });
                futures::future::ready(decoded)
            })
            .boxed();
        Ok(stream)
    }
}
