//! RPC frames multiplexed over one transport.
//!
//! ```text
//! client                                   server
//!   │ Request{id=7, GetPeerMessages} ──────► │
//!   │ ◄────────────────── StreamItem{id=7}  │
//!   │ ◄────────────────── StreamItem{id=7}  │
//!   │ Cancel{id=7} ────────────────────────► │
//!   │ ◄────────────────── StreamEnd{id=7}   │
//! ```
//!
//! Unary calls get exactly one `Response` or `Error`. Streaming calls get
//! zero or more `StreamItem`s followed by `StreamEnd` (or `Error` if the call
//! was rejected before it started).

use crate::domain::error::RpcError;
use crate::domain::types::{
    ChallengeResponse, DisconnectionMessage, GetChallengeRequest, PeerTopicMessage,
    PublishToTopicRequest, PublishToTopicResult, RoomMessage, RoomPublishRequest, RoomRequest,
    RoutingTableMessage, SignedChallenge, SubscriptionRef, SubscriptionRequest,
    SubscriptionResult, SystemTopicMessage, UnsubscriptionResult, UpdatePeerStatusRequest,
    WelcomePeerInformation, ROOM_SERVICE, ROUTING_SERVICE, TOPICS_SERVICE,
};
use serde::{Deserialize, Serialize};

/// Name of the service reachable before authentication.
pub const AUTHENTICATION_SERVICE: &str = "AuthenticationService";

/// One frame body on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcFrame {
    /// Correlates requests with their replies. Chosen by the client.
    pub message_id: u32,
    pub body: FrameBody,
}

impl RpcFrame {
    pub fn new(message_id: u32, body: FrameBody) -> Self {
        Self { message_id, body }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameBody {
    /// Client -> server call
    Request(RpcRequest),
    /// Reply to a unary call
    Response(RpcResponse),
    /// One item of a streaming call
    StreamItem(RpcResponse),
    /// A streaming call finished
    StreamEnd,
    /// The call failed
    Error(RpcError),
    /// Client abandons a call
    Cancel,
}

/// Every callable method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcRequest {
    // AuthenticationService
    GetChallenge(GetChallengeRequest),
    Authenticate(SignedChallenge),
    GetDisconnectionMessage,

    // TopicsService
    PublishToTopic(PublishToTopicRequest),
    SubscribeToPeerMessages(SubscriptionRequest),
    SubscribeToSystemMessages(SubscriptionRequest),
    GetPeerMessages(SubscriptionRef),
    GetSystemMessages(SubscriptionRef),
    UnsubscribeToPeerMessages(SubscriptionRef),
    UnsubscribeToSystemMessages(SubscriptionRef),

    // RoutingService
    UpdatePeerStatus(UpdatePeerStatusRequest),
    GetRoutingTable,

    // RoomService
    PublishMessageToRoom(RoomPublishRequest),
    GetRoomMessages(RoomRequest),
}

impl RpcRequest {
    /// Method name as used in logs and error messages.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::GetChallenge(_) => "getChallenge",
            Self::Authenticate(_) => "authenticate",
            Self::GetDisconnectionMessage => "getDisconnectionMessage",
            Self::PublishToTopic(_) => "publishToTopic",
            Self::SubscribeToPeerMessages(_) => "subscribeToPeerMessages",
            Self::SubscribeToSystemMessages(_) => "subscribeToSystemMessages",
            Self::GetPeerMessages(_) => "getPeerMessages",
            Self::GetSystemMessages(_) => "getSystemMessages",
            Self::UnsubscribeToPeerMessages(_) => "unsubscribeToPeerMessages",
            Self::UnsubscribeToSystemMessages(_) => "unsubscribeToSystemMessages",
            Self::UpdatePeerStatus(_) => "updatePeerStatus",
            Self::GetRoutingTable => "getRoutingTable",
            Self::PublishMessageToRoom(_) => "publishMessageToRoom",
            Self::GetRoomMessages(_) => "getRoomMessages",
        }
    }

    /// Service the method belongs to.
    #[must_use]
    pub fn service(&self) -> &'static str {
        match self {
            Self::GetChallenge(_) | Self::Authenticate(_) | Self::GetDisconnectionMessage => {
                AUTHENTICATION_SERVICE
            }
            Self::PublishToTopic(_)
            | Self::SubscribeToPeerMessages(_)
            | Self::SubscribeToSystemMessages(_)
            | Self::GetPeerMessages(_)
            | Self::GetSystemMessages(_)
            | Self::UnsubscribeToPeerMessages(_)
            | Self::UnsubscribeToSystemMessages(_) => TOPICS_SERVICE,
            Self::UpdatePeerStatus(_) | Self::GetRoutingTable => ROUTING_SERVICE,
            Self::PublishMessageToRoom(_) | Self::GetRoomMessages(_) => ROOM_SERVICE,
        }
    }

    /// Whether replies are a stream.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        matches!(
            self,
            Self::GetPeerMessages(_)
                | Self::GetSystemMessages(_)
                | Self::GetRoutingTable
                | Self::GetRoomMessages(_)
        )
    }
}

/// Every reply payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcResponse {
    Challenge(ChallengeResponse),
    Welcome(WelcomePeerInformation),
    Disconnection(DisconnectionMessage),
    Published(PublishToTopicResult),
    Subscribed(SubscriptionResult),
    Unsubscribed(UnsubscriptionResult),
    PeerMessage(PeerTopicMessage),
    SystemMessage(SystemTopicMessage),
    PeerStatusUpdated,
    RoutingTable(RoutingTableMessage),
    RoomMessage(RoomMessage),
}
