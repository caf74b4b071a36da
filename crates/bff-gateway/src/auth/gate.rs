//! # Authentication Gate
//!
//! The only service reachable before a session exists.
//!
//! ```text
//! getChallenge(addr) ──► challenge (fixed for the connection)
//! authenticate(chain) ──► verify ──► session + method table
//!                            └─ failure: close after the error reply
//! getDisconnectionMessage() ──► waits for eviction ──► grace timer ──► close
//! ```

use crate::context::GatewayContext;
use crate::domain::address::PeerAddress;
use crate::domain::auth_chain::AuthChain;
use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::types::{
    ChallengeResponse, DisconnectionMessage, GetChallengeRequest, SignedChallenge,
    WelcomePeerInformation, AVAILABLE_MODULES,
};
use crate::rpc::handle::ConnectionHandle;
use crate::rpc::services::{AuthenticationService, SessionModules};
use crate::session::state::Session;
use async_trait::async_trait;
use bff_telemetry::{log_peer_event, AUTHENTICATIONS};
use rand::RngCore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Random bytes in a challenge token.
pub const CHALLENGE_BYTES: usize = 32;

/// Authentication service of one connection.
pub struct AuthenticationGate {
    context: Arc<GatewayContext>,
    connection: Arc<ConnectionHandle>,
    challenge: String,
    attempted: AtomicBool,
    session: OnceLock<Arc<Session>>,
    modules: OnceLock<SessionModules>,
}

impl AuthenticationGate {
    pub fn new(context: Arc<GatewayContext>, connection: Arc<ConnectionHandle>) -> Self {
        let mut token = [0u8; CHALLENGE_BYTES];
        rand::thread_rng().fill_bytes(&mut token);
        let challenge = format!("{}{}", context.config.auth.challenge_prefix, hex::encode(token));
        Self {
            context,
            connection,
            challenge,
            attempted: AtomicBool::new(false),
            session: OnceLock::new(),
            modules: OnceLock::new(),
        }
    }

    /// The challenge issued on this connection.
    #[must_use]
    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    /// Session opened on this connection, if any.
    ///
    /// Set as soon as the session is registered, before the handshake reply
    /// is ready, so a teardown racing the handshake still finds it.
    #[must_use]
    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.get()
    }

    /// Method table of the session, once the handshake has completed.
    #[must_use]
    pub fn modules(&self) -> Option<SessionModules> {
        self.modules.get().cloned()
    }

    /// Release the session opened on this connection.
    pub async fn teardown(&self) {
        if let Some(session) = self.session() {
            self.context.teardown_session(session).await;
        }
    }

    fn reject(&self, outcome: &str, error: GatewayError) -> GatewayError {
        AUTHENTICATIONS.with_label_values(&[outcome]).inc();
        self.connection.schedule_close();
        error
    }
}

#[async_trait]
impl AuthenticationService for AuthenticationGate {
    async fn get_challenge(&self, request: GetChallengeRequest) -> GatewayResult<ChallengeResponse> {
        let address = match PeerAddress::parse(&request.address) {
            Ok(address) => address,
            Err(e) => {
                warn!(connection = %self.connection.id(), address = %request.address, "Challenge requested for invalid address");
                return Err(self.reject("invalid_address", e));
            }
        };

        let already_connected = self.context.registry.contains(&address);
        debug!(
            connection = %self.connection.id(),
            peer = %address,
            already_connected,
            "Challenge issued"
        );
        Ok(ChallengeResponse {
            challenge_to_sign: self.challenge.clone(),
            already_connected,
        })
    }

    async fn authenticate(&self, request: SignedChallenge) -> GatewayResult<WelcomePeerInformation> {
        if self.attempted.swap(true, Ordering::SeqCst) {
            return Err(GatewayError::Protocol(
                "connection has already authenticated".into(),
            ));
        }

        let parsed = AuthChain::from_json(&request.auth_chain_json)
            .and_then(|chain| chain.signer().map(|address| (chain, address)));
        let (chain, address) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(connection = %self.connection.id(), error = %e, "Rejected auth chain");
                return Err(self.reject(
                    "failure",
                    GatewayError::AuthenticationFailed(e.to_string()),
                ));
            }
        };

        if let Err(e) = self.context.verifier.verify(&self.challenge, &chain).await {
            log_peer_event!(warn, "Authentication failed", address, connection = %self.connection.id(), error = %e);
            return Err(self.reject(
                "failure",
                GatewayError::AuthenticationFailed(e.to_string()),
            ));
        }

        let session = self
            .context
            .open_session(address.clone(), Arc::clone(&self.connection));
        if self.session.set(Arc::clone(&session)).is_err() {
            self.context.teardown_session(&session).await;
            return Err(GatewayError::Protocol("session already established".into()));
        }

        self.context.announce_connect(&session).await;
        if session.is_torn_down() {
            return Err(GatewayError::Protocol("connection closed during authentication".into()));
        }
        // `set` cannot fail: `attempted` admits a single caller
        let _ = self.modules.set(self.context.session_modules(&session));
        AUTHENTICATIONS.with_label_values(&["success"]).inc();

        Ok(WelcomePeerInformation {
            peer_id: address.into(),
            available_modules: AVAILABLE_MODULES.iter().map(ToString::to_string).collect(),
        })
    }

    async fn get_disconnection_message(&self) -> GatewayResult<DisconnectionMessage> {
        let session = self
            .session()
            .cloned()
            .ok_or_else(|| GatewayError::Protocol("getDisconnectionMessage requires a session".into()))?;

        let reason = session.disconnected().await;

        let grace = self.context.config.auth.disconnect_grace;
        let connection = Arc::clone(&self.connection);
        log_peer_event!(info, "Closing superseded connection after grace period", session.address(), ?reason, grace = ?grace);
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            connection.close();
        });

        Ok(DisconnectionMessage { reason })
    }
}

impl std::fmt::Debug for AuthenticationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationGate")
            .field("connection", &self.connection.id())
            .field("session", &self.session().map(|s| s.address().clone()))
            .finish_non_exhaustive()
    }
}
