//! Comms gateway service - main entry point.
//!
//! Owns the process-wide state and serves connections on any duplex
//! transport.

use crate::context::GatewayContext;
use crate::domain::config::GatewayConfig;
use crate::domain::error::GatewayError;
use crate::ports::outbound::SignatureVerifier;
use crate::routing::engine::MeshRoutingEngine;
use crate::rpc::connection::RpcConnection;
use crate::session::registry::SessionRegistry;
use shared_bus::TopicBus;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Comms gateway service state
pub struct CommsGateway {
    context: Arc<GatewayContext>,
    shutdown: watch::Sender<bool>,
}

impl CommsGateway {
    /// Create a new gateway
    pub fn new(
        config: GatewayConfig,
        bus: Arc<dyn TopicBus>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Result<Self, GatewayError> {
        config
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            context: Arc::new(GatewayContext::new(config, bus, verifier)),
            shutdown,
        })
    }

    /// Serve one connection until it closes.
    pub async fn serve_connection<IO>(&self, io: IO)
    where
        IO: AsyncRead + AsyncWrite + Send + 'static,
    {
        RpcConnection::serve(Arc::clone(&self.context), io, self.shutdown.subscribe()).await;
    }

    /// Accept connections from `listener` until `shutdown` flips to `true`,
    /// then close every open connection and wait for their teardown.
    pub async fn run(
        &self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), GatewayError> {
        let local = listener
            .local_addr()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        info!(addr = %local, salt = %self.context.namespace.salt(), "Comms gateway listening");

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                changed = shutdown.wait_for(|stop| *stop) => {
                    if changed.is_err() {
                        debug!("Shutdown sender dropped");
                    }
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(remote = %remote, error = %e, "Failed to set TCP_NODELAY");
                        }
                        debug!(remote = %remote, "Accepted connection");
                        let context = Arc::clone(&self.context);
                        let signal = self.shutdown.subscribe();
                        connections.spawn(RpcConnection::serve(context, stream, signal));
                    }
                    Err(e) => error!(error = %e, "Accept failed"),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        info!(open = connections.len(), "Shutting down, closing connections");
        self.shutdown();
        while connections.join_next().await.is_some() {}
        info!("Comms gateway stopped");
        Ok(())
    }

    /// Ask every connection served by this gateway to close.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Shared state behind every connection.
    #[must_use]
    pub fn context(&self) -> &Arc<GatewayContext> {
        &self.context
    }

    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.context.config
    }

    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.context.registry
    }

    #[must_use]
    pub fn routing(&self) -> &Arc<MeshRoutingEngine> {
        &self.context.routing
    }

    /// Live session count.
    #[must_use]
    pub fn connected_peers(&self) -> usize {
        self.context.connected_peers()
    }
}

impl std::fmt::Debug for CommsGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommsGateway")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
