//! Request and response messages of the RPC services.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Module name of the topics service.
pub const TOPICS_SERVICE: &str = "TopicsService";
/// Module name of the routing service.
pub const ROUTING_SERVICE: &str = "RoutingService";
/// Module name of the room service.
pub const ROOM_SERVICE: &str = "RoomService";

/// Services bound into a session at authentication.
pub const AVAILABLE_MODULES: [&str; 3] = [TOPICS_SERVICE, ROUTING_SERVICE, ROOM_SERVICE];

// =============================================================================
// AUTHENTICATION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetChallengeRequest {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    pub challenge_to_sign: String,
    pub already_connected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedChallenge {
    pub auth_chain_json: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomePeerInformation {
    pub peer_id: String,
    pub available_modules: Vec<String>,
}

/// Why the server is about to close a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectionReason {
    /// A newer connection authenticated with the same address.
    Kicked,
    /// The server is shutting down.
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectionMessage {
    pub reason: DisconnectionReason,
}

// =============================================================================
// TOPICS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishToTopicRequest {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishToTopicResult {
    pub ok: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub topic: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResult {
    pub subscription_id: u32,
}

/// Names an existing subscription (streaming and unsubscribe calls).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRef {
    pub subscription_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscriptionResult {
    pub ok: bool,
}

/// Message received on a peer-namespace subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerTopicMessage {
    pub payload: Vec<u8>,
    pub topic: String,
    pub sender: String,
}

/// Message received on a system-namespace subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemTopicMessage {
    pub payload: Vec<u8>,
    pub topic: String,
}

// =============================================================================
// ROUTING
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePeerStatusRequest {
    pub room: String,
    pub connected_to: Vec<String>,
}

/// Intermediate hops towards one destination; empty means direct.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayPeers {
    pub peers: Vec<String>,
}

/// A peer's personal routing table. Absent destinations go through the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTableMessage {
    pub table: BTreeMap<String, RelayPeers>,
}

// =============================================================================
// ROOMS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPublishRequest {
    pub room: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRequest {
    pub room: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMessage {
    pub room: String,
    pub sender: String,
    pub payload: Vec<u8>,
}
