//! Salted topic namespaces.
//!
//! ```text
//! peer:    <salt>.peer.<sender>.<topic>
//! system:  <salt>.<topic>
//! room:    <salt>.room.<room>.<sender>
//! ```
//!
//! The sender segment is always the authenticated session address, so a
//! client can never publish as someone else.

use crate::domain::address::PeerAddress;
use crate::domain::error::{GatewayError, GatewayResult};
use shared_bus::topic::{self, SEPARATOR, WILDCARD};

const PEER_SEGMENT: &str = "peer";
const ROOM_SEGMENT: &str = "room";

/// Builds and strips salted subjects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNamespace {
    salt: String,
}

impl TopicNamespace {
    /// Namespace under `salt`.
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    /// The salt.
    #[must_use]
    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// Subject a peer publishes `topic` on.
    pub fn peer_topic(&self, sender: &PeerAddress, topic: &str) -> GatewayResult<String> {
        topic::validate(topic)?;
        Ok(format!("{}.{PEER_SEGMENT}.{sender}.{topic}", self.salt))
    }

    /// Pattern matching `topic` from any sender.
    pub fn peer_pattern(&self, topic: &str) -> GatewayResult<String> {
        topic::validate(topic)?;
        Ok(format!("{}.{PEER_SEGMENT}.{WILDCARD}.{topic}", self.salt))
    }

    /// Subject of a system topic.
    pub fn system_topic(&self, topic: &str) -> GatewayResult<String> {
        topic::validate(topic)?;
        Ok(format!("{}.{topic}", self.salt))
    }

    /// Split a peer subject into `(sender, topic)`.
    #[must_use]
    pub fn demangle_peer<'a>(&self, subject: &'a str) -> Option<(&'a str, &'a str)> {
        let rest = self.strip_salt(subject)?;
        let rest = rest.strip_prefix(PEER_SEGMENT)?.strip_prefix(SEPARATOR)?;
        let (sender, topic) = rest.split_once(SEPARATOR)?;
        Some((sender, topic))
    }

    /// Strip the salt from a system subject.
    #[must_use]
    pub fn demangle_system<'a>(&self, subject: &'a str) -> Option<&'a str> {
        self.strip_salt(subject)
    }

    /// Subject a peer publishes on in `room`.
    pub fn room_topic(&self, room: &str, sender: &PeerAddress) -> GatewayResult<String> {
        validate_room(room)?;
        Ok(format!("{}.{ROOM_SEGMENT}.{room}.{sender}", self.salt))
    }

    /// Pattern matching every sender in `room`.
    pub fn room_pattern(&self, room: &str) -> GatewayResult<String> {
        validate_room(room)?;
        Ok(format!("{}.{ROOM_SEGMENT}.{room}.{WILDCARD}", self.salt))
    }

    /// Sender segment of a room subject.
    #[must_use]
    pub fn demangle_room<'a>(&self, subject: &'a str) -> Option<(&'a str, &'a str)> {
        let rest = self.strip_salt(subject)?;
        let rest = rest.strip_prefix(ROOM_SEGMENT)?.strip_prefix(SEPARATOR)?;
        rest.split_once(SEPARATOR)
    }

    fn strip_salt<'a>(&self, subject: &'a str) -> Option<&'a str> {
        subject.strip_prefix(self.salt.as_str())?.strip_prefix(SEPARATOR)
    }
}

/// A room name is exactly one non-empty segment.
pub fn validate_room(room: &str) -> GatewayResult<()> {
    if room.is_empty() || room.contains(SEPARATOR) || room == WILDCARD {
        return Err(GatewayError::InvalidRequest(format!(
            "invalid room name: {room:?}"
        )));
    }
    Ok(())
}
