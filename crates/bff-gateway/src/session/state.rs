//! Authenticated peer session.

use crate::domain::address::PeerAddress;
use crate::domain::types::{DisconnectionReason, RoutingTableMessage};
use crate::rpc::handle::ConnectionHandle;
use parking_lot::Mutex;
use shared_bus::{BusMessage, BusSubscription, Channel};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::watch;
use tracing::debug;

/// Namespace a subscription belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    /// `<salt>.peer.<sender>.<topic>`
    Peer,
    /// `<salt>.<topic>`
    System,
}

/// State of one authenticated connection.
///
/// Sessions are shared as `Arc<Session>`; the registry compares them by
/// pointer identity.
pub struct Session {
    address: PeerAddress,
    connection: Arc<ConnectionHandle>,
    next_subscription_id: AtomicU32,
    peer_subscriptions: Mutex<HashMap<u32, BusSubscription>>,
    system_subscriptions: Mutex<HashMap<u32, BusSubscription>>,
    disconnection: watch::Sender<Option<DisconnectionReason>>,
    routing_channel: OnceLock<Channel<RoutingTableMessage>>,
    torn_down: AtomicBool,
}

impl Session {
    /// Create a session bound to `connection`.
    #[must_use]
    pub fn new(address: PeerAddress, connection: Arc<ConnectionHandle>) -> Self {
        let (disconnection, _) = watch::channel(None);
        Self {
            address,
            connection,
            next_subscription_id: AtomicU32::new(0),
            peer_subscriptions: Mutex::new(HashMap::new()),
            system_subscriptions: Mutex::new(HashMap::new()),
            disconnection,
            routing_channel: OnceLock::new(),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Authenticated address.
    #[must_use]
    pub fn address(&self) -> &PeerAddress {
        &self.address
    }

    /// The connection this session lives on.
    #[must_use]
    pub fn connection(&self) -> &Arc<ConnectionHandle> {
        &self.connection
    }

    /// Next subscription id. Starts at 0 and never repeats.
    pub fn allocate_subscription_id(&self) -> u32 {
        self.next_subscription_id.fetch_add(1, Ordering::SeqCst)
    }

    fn subscriptions(&self, kind: SubscriptionKind) -> &Mutex<HashMap<u32, BusSubscription>> {
        match kind {
            SubscriptionKind::Peer => &self.peer_subscriptions,
            SubscriptionKind::System => &self.system_subscriptions,
        }
    }

    /// Store a subscription under `id`.
    pub fn insert_subscription(&self, kind: SubscriptionKind, id: u32, subscription: BusSubscription) {
        self.subscriptions(kind).lock().insert(id, subscription);
    }

    /// Delivery channel of subscription `id`.
    #[must_use]
    pub fn subscription_channel(&self, kind: SubscriptionKind, id: u32) -> Option<Channel<BusMessage>> {
        self.subscriptions(kind)
            .lock()
            .get(&id)
            .map(|subscription| subscription.channel().clone())
    }

    /// Remove subscription `id`, if present.
    pub fn remove_subscription(&self, kind: SubscriptionKind, id: u32) -> Option<BusSubscription> {
        self.subscriptions(kind).lock().remove(&id)
    }

    /// Number of live subscriptions of `kind`.
    #[must_use]
    pub fn subscription_count(&self, kind: SubscriptionKind) -> usize {
        self.subscriptions(kind).lock().len()
    }

    /// Close and forget every subscription. Returns how many were closed.
    pub fn close_subscriptions(&self) -> usize {
        let mut closed = 0;
        for kind in [SubscriptionKind::Peer, SubscriptionKind::System] {
            let drained: Vec<BusSubscription> =
                self.subscriptions(kind).lock().drain().map(|(_, s)| s).collect();
            for subscription in drained {
                subscription.unsubscribe();
                closed += 1;
            }
        }
        closed
    }

    /// Tell the session it is about to be closed.
    pub fn notify_disconnection(&self, reason: DisconnectionReason) {
        self.disconnection.send_replace(Some(reason));
        debug!(peer = %self.address, ?reason, "Disconnection signalled");
    }

    /// Wait until [`Session::notify_disconnection`] has been called.
    pub async fn disconnected(&self) -> DisconnectionReason {
        let mut receiver = self.disconnection.subscribe();
        let reason = match receiver.wait_for(Option::is_some).await {
            Ok(reason) => reason.unwrap_or(DisconnectionReason::Shutdown),
            Err(_) => DisconnectionReason::Shutdown,
        };
        reason
    }

    /// The routing output channel, created on first call.
    pub fn attach_routing_channel(&self, capacity: usize) -> Channel<RoutingTableMessage> {
        self.routing_channel
            .get_or_init(|| Channel::bounded(capacity))
            .clone()
    }

    /// The routing output channel if one was attached.
    #[must_use]
    pub fn routing_channel(&self) -> Option<&Channel<RoutingTableMessage>> {
        self.routing_channel.get()
    }

    /// Mark the session torn down. `true` only for the first caller.
    pub fn mark_torn_down(&self) -> bool {
        !self.torn_down.swap(true, Ordering::SeqCst)
    }

    /// Whether teardown has started.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.address)
            .field("connection", &self.connection.id())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::{InMemoryTopicBus, TopicBus};
    use std::time::Duration;
    use tokio::time::timeout;

    fn session() -> Session {
        Session::new(
            PeerAddress::from_bytes([7; 20]),
            Arc::new(ConnectionHandle::new()),
        )
    }

    #[test]
    fn test_subscription_ids_start_at_zero() {
        let session = session();
        assert_eq!(session.allocate_subscription_id(), 0);
        assert_eq!(session.allocate_subscription_id(), 1);
        assert_eq!(session.allocate_subscription_id(), 2);
    }

    #[tokio::test]
    async fn test_subscription_maps_are_separate() {
        let bus = InMemoryTopicBus::new();
        let session = session();
        let id = session.allocate_subscription_id();
        session.insert_subscription(SubscriptionKind::Peer, id, bus.subscribe("a", 4).await.unwrap());

        assert!(session.subscription_channel(SubscriptionKind::Peer, id).is_some());
        assert!(session.subscription_channel(SubscriptionKind::System, id).is_none());
        assert!(session.remove_subscription(SubscriptionKind::System, id).is_none());
    }

    #[tokio::test]
    async fn test_close_subscriptions_detaches_from_bus() {
        let bus = InMemoryTopicBus::new();
        let session = session();
        session.insert_subscription(SubscriptionKind::Peer, 0, bus.subscribe("a", 4).await.unwrap());
        session.insert_subscription(SubscriptionKind::System, 1, bus.subscribe("b", 4).await.unwrap());
        let channel = session.subscription_channel(SubscriptionKind::Peer, 0).unwrap();

        assert_eq!(session.close_subscriptions(), 2);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(channel.is_closed());
        assert_eq!(session.subscription_count(SubscriptionKind::System), 0);
    }

    #[tokio::test]
    async fn test_disconnected_waits_for_notification() {
        let session = Arc::new(session());
        let waiter = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.disconnected().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        session.notify_disconnection(DisconnectionReason::Kicked);

        let reason = timeout(Duration::from_secs(1), waiter)
            .await
            .expect("timeout")
            .unwrap();
        assert_eq!(reason, DisconnectionReason::Kicked);
    }

    #[test]
    fn test_routing_channel_created_once() {
        let session = session();
        assert!(session.routing_channel().is_none());
        let first = session.attach_routing_channel(4);
        let second = session.attach_routing_channel(8);
        assert!(first.same_channel(&second));
        assert_eq!(second.capacity(), 4);
    }

    #[test]
    fn test_mark_torn_down_once() {
        let session = session();
        assert!(session.mark_torn_down());
        assert!(!session.mark_torn_down());
        assert!(session.is_torn_down());
    }
}
