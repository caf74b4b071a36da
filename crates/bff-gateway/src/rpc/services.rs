//! Typed RPC service interfaces and the per-session method table.
//!
//! The authentication service is reachable on every connection. The other
//! services are bound into a [`SessionModules`] table when authentication
//! succeeds; calls made before that fail with a protocol error.

use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::types::{
    ChallengeResponse, DisconnectionMessage, GetChallengeRequest, PeerTopicMessage,
    PublishToTopicRequest, PublishToTopicResult, RoomMessage, RoomPublishRequest, RoomRequest,
    RoutingTableMessage, SignedChallenge, SubscriptionRef, SubscriptionRequest,
    SubscriptionResult, SystemTopicMessage, UnsubscriptionResult, UpdatePeerStatusRequest,
    WelcomePeerInformation,
};
use crate::rpc::protocol::{RpcRequest, RpcResponse};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;

/// Challenge/response handshake.
#[async_trait]
pub trait AuthenticationService: Send + Sync {
    /// Issue the connection's challenge for `address`.
    async fn get_challenge(&self, request: GetChallengeRequest) -> GatewayResult<ChallengeResponse>;

    /// Verify the signed challenge and open a session.
    async fn authenticate(&self, request: SignedChallenge) -> GatewayResult<WelcomePeerInformation>;

    /// Wait until the session is superseded.
    async fn get_disconnection_message(&self) -> GatewayResult<DisconnectionMessage>;
}

/// Salted topic publish/subscribe.
#[async_trait]
pub trait TopicsService: Send + Sync {
    async fn publish_to_topic(&self, request: PublishToTopicRequest) -> GatewayResult<PublishToTopicResult>;

    async fn subscribe_to_peer_messages(&self, request: SubscriptionRequest) -> GatewayResult<SubscriptionResult>;

    async fn subscribe_to_system_messages(&self, request: SubscriptionRequest) -> GatewayResult<SubscriptionResult>;

    /// Stream of a peer subscription. Unknown ids yield an ended stream.
    fn get_peer_messages(&self, request: SubscriptionRef) -> BoxStream<'static, PeerTopicMessage>;

    /// Stream of a system subscription. Unknown ids yield an ended stream.
    fn get_system_messages(&self, request: SubscriptionRef) -> BoxStream<'static, SystemTopicMessage>;

    fn unsubscribe_to_peer_messages(&self, request: SubscriptionRef) -> UnsubscriptionResult;

    fn unsubscribe_to_system_messages(&self, request: SubscriptionRef) -> UnsubscriptionResult;
}

/// Mesh connectivity reports and routing tables.
pub trait RoutingService: Send + Sync {
    fn update_peer_status(&self, request: UpdatePeerStatusRequest) -> GatewayResult<()>;

    fn get_routing_table(&self) -> BoxStream<'static, RoutingTableMessage>;
}

/// Room broadcast.
#[async_trait]
pub trait RoomService: Send + Sync {
    async fn publish_message_to_room(&self, request: RoomPublishRequest) -> GatewayResult<PublishToTopicResult>;

    async fn get_room_messages(&self, request: RoomRequest) -> GatewayResult<BoxStream<'static, RoomMessage>>;
}

/// Outcome of dispatching one request.
pub enum Reply {
    /// Single response.
    Unary(RpcResponse),
    /// Zero or more items followed by end-of-stream.
    Stream(BoxStream<'static, RpcResponse>),
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Unary(response) => f.debug_tuple("Unary").field(response).finish(),
            Reply::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Services bound to an authenticated session.
#[derive(Clone)]
pub struct SessionModules {
    pub topics: Arc<dyn TopicsService>,
    pub routing: Arc<dyn RoutingService>,
    pub rooms: Arc<dyn RoomService>,
}

impl SessionModules {
    /// Route a session-scoped request.
    pub async fn dispatch(&self, request: RpcRequest) -> GatewayResult<Reply> {
        let reply = match request {
            RpcRequest::PublishToTopic(req) => {
                Reply::Unary(RpcResponse::Published(self.topics.publish_to_topic(req).await?))
            }
            RpcRequest::SubscribeToPeerMessages(req) => Reply::Unary(RpcResponse::Subscribed(
                self.topics.subscribe_to_peer_messages(req).await?,
            )),
            RpcRequest::SubscribeToSystemMessages(req) => Reply::Unary(RpcResponse::Subscribed(
                self.topics.subscribe_to_system_messages(req).await?,
            )),
            RpcRequest::GetPeerMessages(req) => Reply::Stream(
                self.topics
                    .get_peer_messages(req)
                    .map(RpcResponse::PeerMessage)
                    .boxed(),
            ),
            RpcRequest::GetSystemMessages(req) => Reply::Stream(
                self.topics
                    .get_system_messages(req)
                    .map(RpcResponse::SystemMessage)
                    .boxed(),
            ),
            RpcRequest::UnsubscribeToPeerMessages(req) => Reply::Unary(RpcResponse::Unsubscribed(
                self.topics.unsubscribe_to_peer_messages(req),
            )),
            RpcRequest::UnsubscribeToSystemMessages(req) => Reply::Unary(
                RpcResponse::Unsubscribed(self.topics.unsubscribe_to_system_messages(req)),
            ),
            RpcRequest::UpdatePeerStatus(req) => {
                self.routing.update_peer_status(req)?;
                Reply::Unary(RpcResponse::PeerStatusUpdated)
            }
            RpcRequest::GetRoutingTable => Reply::Stream(
                self.routing
                    .get_routing_table()
                    .map(RpcResponse::RoutingTable)
                    .boxed(),
            ),
            RpcRequest::PublishMessageToRoom(req) => Reply::Unary(RpcResponse::Published(
                self.rooms.publish_message_to_room(req).await?,
            )),
            RpcRequest::GetRoomMessages(req) => Reply::Stream(
                self.rooms
                    .get_room_messages(req)
                    .await?
                    .map(RpcResponse::RoomMessage)
                    .boxed(),
            ),
            RpcRequest::GetChallenge(_)
            | RpcRequest::Authenticate(_)
            | RpcRequest::GetDisconnectionMessage => {
                return Err(GatewayError::Protocol(format!(
                    "{} is not a session method",
                    request.method()
                )))
            }
        };
        Ok(reply)
    }
}

impl std::fmt::Debug for SessionModules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionModules").finish_non_exhaustive()
    }
}

/// Route any request. Session methods need `modules`.
pub async fn dispatch(
    auth: &dyn AuthenticationService,
    modules: Option<SessionModules>,
    request: RpcRequest,
) -> GatewayResult<Reply> {
    match request {
        RpcRequest::GetChallenge(req) => Ok(Reply::Unary(RpcResponse::Challenge(
            auth.get_challenge(req).await?,
        ))),
        RpcRequest::Authenticate(req) => Ok(Reply::Unary(RpcResponse::Welcome(
            auth.authenticate(req).await?,
        ))),
        RpcRequest::GetDisconnectionMessage => Ok(Reply::Unary(RpcResponse::Disconnection(
            auth.get_disconnection_message().await?,
        ))),
        request => match modules {
            Some(modules) => modules.dispatch(request).await,
            None => Err(GatewayError::Protocol(format!(
                "{} requires an authenticated session",
                request.method()
            ))),
        },
    }
}
