//! Gateway error types and the numeric codes peers see on the wire.
//!
//! Internally every failure is a [`GatewayError`]; at the RPC boundary it is
//! turned into an [`RpcError`] carrying a JSON-RPC style code.

use serde::{Deserialize, Serialize};
use shared_bus::{BusError, TopicError};
use std::fmt;

/// Error codes sent to peers
pub mod codes {
    // JSON-RPC 2.0 standard errors (-32700 to -32600)
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    // Server errors (-32000 to -32099)
    pub const SERVER_ERROR: i32 = -32000;
    pub const RESOURCE_NOT_FOUND: i32 = -32001;
    pub const RESOURCE_UNAVAILABLE: i32 = -32002;

    // Session errors
    pub const UNAUTHORIZED: i32 = -32010;
    pub const ACTION_NOT_ALLOWED: i32 = -32011;
}

/// Error categories of the gateway taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, rejected before any state change
    Validation,
    /// Bad or unverifiable signature
    Authentication,
    /// Call not allowed in the connection's current state
    Protocol,
    /// Unknown subscription id (non-fatal)
    SubscriptionNotFound,
    /// Broker publish/subscribe failure
    Broker,
    /// Everything else
    Internal,
}

/// Gateway errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Address is not `0x` + 40 hex digits
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Topic failed segment validation
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// Any other malformed request field
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Signature chain rejected
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Operation not allowed in the connection's state
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Subscription id unknown to the session
    #[error("subscription {0} not found")]
    SubscriptionNotFound(u32),

    /// Broker failure
    #[error("broker error: {0}")]
    Broker(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Shutdown in progress
    #[error("shutdown in progress")]
    ShuttingDown,
}

impl GatewayError {
    /// Category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAddress(_) | Self::InvalidTopic(_) | Self::InvalidRequest(_) => {
                ErrorKind::Validation
            }
            Self::AuthenticationFailed(_) => ErrorKind::Authentication,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::SubscriptionNotFound(_) => ErrorKind::SubscriptionNotFound,
            Self::Broker(_) => ErrorKind::Broker,
            Self::Config(_) | Self::Transport(_) | Self::ShuttingDown => ErrorKind::Internal,
        }
    }
}

impl From<TopicError> for GatewayError {
    fn from(e: TopicError) -> Self {
        GatewayError::InvalidTopic(e.to_string())
    }
}

impl From<BusError> for GatewayError {
    fn from(e: BusError) -> Self {
        match e {
            BusError::InvalidTopic(topic) => topic.into(),
            BusError::Closed => GatewayError::ShuttingDown,
            BusError::Broker(message) => GatewayError::Broker(message),
        }
    }
}

/// Error as sent to the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    /// Numeric error code, see [`codes`]
    pub code: i32,
    /// Human readable message
    pub message: String,
}

impl RpcError {
    /// Create a new RPC error
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Invalid request - frame body not a request
    pub fn invalid_request(details: impl Into<String>) -> Self {
        Self::new(
            codes::INVALID_REQUEST,
            format!("Invalid request: {}", details.into()),
        )
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

impl From<&GatewayError> for RpcError {
    fn from(e: &GatewayError) -> Self {
        let code = match e.kind() {
            ErrorKind::Validation => codes::INVALID_PARAMS,
            ErrorKind::Authentication => codes::UNAUTHORIZED,
            ErrorKind::Protocol => codes::ACTION_NOT_ALLOWED,
            ErrorKind::SubscriptionNotFound => codes::RESOURCE_NOT_FOUND,
            ErrorKind::Broker => codes::RESOURCE_UNAVAILABLE,
            ErrorKind::Internal => codes::SERVER_ERROR,
        };
        RpcError::new(code, e.to_string())
    }
}

impl From<GatewayError> for RpcError {
    fn from(e: GatewayError) -> Self {
        RpcError::from(&e)
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            GatewayError::InvalidTopic("a..b".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            GatewayError::AuthenticationFailed("bad".into()).kind(),
            ErrorKind::Authentication
        );
        assert_eq!(
            GatewayError::Protocol("unauthenticated".into()).kind(),
            ErrorKind::Protocol
        );
        assert_eq!(
            GatewayError::SubscriptionNotFound(3).kind(),
            ErrorKind::SubscriptionNotFound
        );
        assert_eq!(GatewayError::ShuttingDown.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_rpc_error_codes() {
        let err = RpcError::from(GatewayError::InvalidAddress("0x1".into()));
        assert_eq!(err.code, codes::INVALID_PARAMS);
        assert!(err.message.contains("0x1"));

        let err = RpcError::from(GatewayError::AuthenticationFailed("nope".into()));
        assert_eq!(err.code, codes::UNAUTHORIZED);

        let err = RpcError::invalid_request("not a request");
        assert_eq!(err.code, codes::INVALID_REQUEST);
        assert_eq!(err.to_string(), "[-32600] Invalid request: not a request");
    }

    #[test]
    fn test_from_bus_error() {
        let err: GatewayError = BusError::Broker("down".into()).into();
        assert_eq!(err, GatewayError::Broker("down".into()));

        let err: GatewayError = BusError::InvalidTopic(TopicError::Empty).into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
