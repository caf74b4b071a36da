//! Process-wide collaborators shared by every connection.

use crate::domain::address::PeerAddress;
use crate::domain::config::GatewayConfig;
use crate::ports::outbound::SignatureVerifier;
use crate::routing::engine::{MeshRoutingEngine, SessionRouting};
use crate::rpc::handle::ConnectionHandle;
use crate::rpc::services::SessionModules;
use crate::session::namespace::TopicNamespace;
use crate::session::registry::SessionRegistry;
use crate::session::rooms::RoomChannel;
use crate::session::state::Session;
use crate::session::subscriptions::SubscriptionManager;
use bff_telemetry::{log_peer_event, CONNECTED_USERS};
use bytes::Bytes;
use shared_bus::TopicBus;
use std::sync::Arc;
use tracing::warn;

/// Everything a connection needs besides its own transport.
pub struct GatewayContext {
    pub config: GatewayConfig,
    pub bus: Arc<dyn TopicBus>,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub registry: SessionRegistry,
    pub routing: Arc<MeshRoutingEngine>,
    pub namespace: TopicNamespace,
}

impl GatewayContext {
    pub fn new(
        config: GatewayConfig,
        bus: Arc<dyn TopicBus>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        let registry = SessionRegistry::new();
        let routing = Arc::new(MeshRoutingEngine::new(
            config.routing.clone(),
            registry.clone(),
        ));
        let namespace = TopicNamespace::new(config.topics.salt.clone());
        Self {
            config,
            bus,
            verifier,
            registry,
            routing,
            namespace,
        }
    }

    /// Register a session for `address` on `connection`, evicting any
    /// previous one. No await happens between registration and return.
    pub fn open_session(
        &self,
        address: PeerAddress,
        connection: Arc<ConnectionHandle>,
    ) -> Arc<Session> {
        let session = Arc::new(Session::new(address, connection));
        let evicted = self.registry.register(Arc::clone(&session));
        self.refresh_gauge();

        log_peer_event!(
            info,
            "Peer connected",
            session.address(),
            connection = %session.connection().id(),
            replaced = evicted.is_some()
        );
        session
    }

    /// Publish the `connect` lifecycle event of `session`.
    pub async fn announce_connect(&self, session: &Session) {
        self.announce(session, "connect").await;
    }

    /// Method table bound to `session`.
    #[must_use]
    pub fn session_modules(&self, session: &Arc<Session>) -> SessionModules {
        let buffer = self.config.topics.subscription_buffer;
        SessionModules {
            topics: Arc::new(SubscriptionManager::new(
                Arc::clone(session),
                Arc::clone(&self.bus),
                self.namespace.clone(),
                buffer,
            )),
            routing: Arc::new(SessionRouting::new(
                Arc::clone(&self.routing),
                Arc::clone(session),
            )),
            rooms: Arc::new(RoomChannel::new(
                Arc::clone(session),
                Arc::clone(&self.bus),
                self.namespace.clone(),
                buffer,
            )),
        }
    }

    /// Release a session's resources. Safe to call more than once.
    ///
    /// The disconnect announcement and mesh cleanup only happen while
    /// `session` is still the registered session for its address.
    pub async fn teardown_session(&self, session: &Arc<Session>) {
        if !session.mark_torn_down() {
            return;
        }

        let subscriptions = session.close_subscriptions();
        if let Some(channel) = session.routing_channel() {
            channel.close();
        }

        let current = self.registry.remove(session);
        self.refresh_gauge();
        if current {
            self.routing.forget_peer(session.address());
            self.announce(session, "disconnect").await;
        }

        log_peer_event!(
            info,
            "Peer disconnected",
            session.address(),
            connection = %session.connection().id(),
            subscriptions,
            superseded = !current
        );
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn connected_peers(&self) -> usize {
        self.registry.len()
    }

    fn refresh_gauge(&self) {
        CONNECTED_USERS.set(self.registry.len() as f64);
    }

    async fn announce(&self, session: &Session, event: &str) {
        let topic = format!("peer.{}.{event}", session.address());
        let subject = match self.namespace.system_topic(&topic) {
            Ok(subject) => subject,
            Err(e) => {
                warn!(peer = %session.address(), error = %e, "Invalid lifecycle topic");
                return;
            }
        };
        if let Err(e) = self.bus.publish(&subject, Bytes::new()).await {
            warn!(peer = %session.address(), event, error = %e, "Failed to publish lifecycle event");
        }
    }
}

impl std::fmt::Debug for GatewayContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayContext")
            .field("sessions", &self.registry.len())
            .field("salt", &self.namespace.salt())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::EcdsaAuthChainVerifier;
    use crate::domain::types::DisconnectionReason;
    use shared_bus::InMemoryTopicBus;

    fn context(bus: &InMemoryTopicBus) -> GatewayContext {
        GatewayContext::new(
            GatewayConfig::default(),
            Arc::new(bus.clone()),
            Arc::new(EcdsaAuthChainVerifier::new()),
        )
    }

    fn addr(n: u8) -> PeerAddress {
        PeerAddress::from_bytes([n; 20])
    }

    async fn establish(context: &GatewayContext, n: u8) -> (Arc<Session>, SessionModules) {
        let session = context.open_session(addr(n), Arc::new(ConnectionHandle::new()));
        context.announce_connect(&session).await;
        let modules = context.session_modules(&session);
        (session, modules)
    }

    async fn lifecycle_subscription(
        bus: &InMemoryTopicBus,
        context: &GatewayContext,
        event: &str,
    ) -> shared_bus::BusSubscription {
        let pattern = context
            .namespace
            .system_topic(&format!("peer.*.{event}"))
            .unwrap();
        bus.subscribe(&pattern, 8).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_session_announces_connect() {
        let bus = InMemoryTopicBus::new();
        let context = context(&bus);
        let connects = lifecycle_subscription(&bus, &context, "connect").await;

        let (session, _) = establish(&context, 1).await;

        assert_eq!(context.connected_peers(), 1);
        let message = connects.channel().try_recv().unwrap();
        assert_eq!(
            message.subject,
            format!("client-proto.peer.{}.connect", session.address())
        );
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let bus = InMemoryTopicBus::new();
        let context = context(&bus);
        let disconnects = lifecycle_subscription(&bus, &context, "disconnect").await;
        let (session, _) = establish(&context, 1).await;

        context.teardown_session(&session).await;
        context.teardown_session(&session).await;

        assert_eq!(context.connected_peers(), 0);
        assert!(disconnects.channel().try_recv().is_some());
        assert!(disconnects.channel().try_recv().is_none());
    }

    #[tokio::test]
    async fn test_superseded_teardown_is_silent() {
        let bus = InMemoryTopicBus::new();
        let context = context(&bus);
        let disconnects = lifecycle_subscription(&bus, &context, "disconnect").await;

        let (old, _) = establish(&context, 1).await;
        let (new, _) = establish(&context, 1).await;
        assert_eq!(old.disconnected().await, DisconnectionReason::Kicked);

        context.teardown_session(&old).await;

        assert!(context.registry.is_current(&new));
        assert_eq!(context.connected_peers(), 1);
        assert!(disconnects.channel().try_recv().is_none());
    }

    #[tokio::test]
    async fn test_teardown_forgets_mesh_reports() {
        let bus = InMemoryTopicBus::new();
        let context = context(&bus);
        let (session, modules) = establish(&context, 1).await;
        modules
            .routing
            .update_peer_status(crate::domain::types::UpdatePeerStatusRequest {
                room: "r".into(),
                connected_to: vec![addr(2).to_string()],
            })
            .unwrap();
        assert_eq!(context.routing.mesh().room_count(), 1);

        context.teardown_session(&session).await;
        assert_eq!(context.routing.mesh().room_count(), 0);
    }
}
