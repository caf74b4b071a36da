//! # Comms BFF Runtime
//!
//! Entry point of the comms backend-for-frontend.
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry (`BFF_LOG_LEVEL`, `BFF_JSON_LOGS`, ...)
//! 2. Load gateway configuration from `BFF_*` variables
//! 3. Wire the in-process topic bus and the ECDSA auth chain verifier
//! 4. Bind the listener and serve until Ctrl+C

use std::sync::Arc;

use anyhow::{Context, Result};
use bff_gateway::{CommsGateway, EcdsaAuthChainVerifier, GatewayConfig, VERSION};
use bff_telemetry::{init_telemetry, record_build_info, TelemetryConfig};
use shared_bus::InMemoryTopicBus;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    init_telemetry(&telemetry).context("failed to initialize telemetry")?;

    let config = GatewayConfig::from_env().context("invalid gateway configuration")?;
    record_build_info(VERSION, &config.topics.salt);
    let addr = config.listen_addr();

    let gateway = CommsGateway::new(
        config,
        Arc::new(InMemoryTopicBus::new()),
        Arc::new(EcdsaAuthChainVerifier::new()),
    )?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
        }
        shutdown_tx.send_replace(true);
    });

    info!(version = VERSION, addr = %addr, "Comms BFF starting");
    gateway.run(listener, shutdown_rx).await?;
    Ok(())
}
