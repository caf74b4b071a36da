//! Process-wide map of authenticated address -> live session.

use crate::domain::address::PeerAddress;
use crate::domain::types::DisconnectionReason;
use crate::session::state::Session;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// One live session per address.
///
/// Cheap to clone; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<PeerAddress, Arc<Session>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `session` under its address, evicting any previous session.
    ///
    /// The evicted session is told it was kicked and tears itself down
    /// after its grace period. Returns the evicted session.
    pub fn register(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        let previous = self
            .sessions
            .insert(session.address().clone(), Arc::clone(&session))?;

        if Arc::ptr_eq(&previous, &session) {
            return None;
        }
        info!(
            peer = %session.address(),
            old_connection = %previous.connection().id(),
            new_connection = %session.connection().id(),
            "Session superseded, kicking previous connection"
        );
        previous.notify_disconnection(DisconnectionReason::Kicked);
        Some(previous)
    }

    /// Remove the entry for the session's address only if it is `session`.
    ///
    /// Returns `true` if the entry was removed.
    pub fn remove(&self, session: &Arc<Session>) -> bool {
        self.sessions
            .remove_if(session.address(), |_, stored| Arc::ptr_eq(stored, session))
            .is_some()
    }

    /// Session currently registered for `address`.
    #[must_use]
    pub fn get(&self, address: &PeerAddress) -> Option<Arc<Session>> {
        self.sessions.get(address).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether `address` has a live session.
    #[must_use]
    pub fn contains(&self, address: &PeerAddress) -> bool {
        self.sessions.contains_key(address)
    }

    /// Whether `session` is the one registered for its address.
    #[must_use]
    pub fn is_current(&self, session: &Arc<Session>) -> bool {
        self.sessions
            .get(session.address())
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), session))
    }

    /// Live session count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of all registered sessions.
    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}
