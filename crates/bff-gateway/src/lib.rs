//! # Comms Gateway
//!
//! Backend-for-frontend between virtual-world clients and the comms
//! infrastructure.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           COMMS GATEWAY                              │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  transport ──► RpcConnection (frames, call tasks, writer)            │
//! │                     │                                                │
//! │          ┌──────────┴───────────┐                                    │
//! │          ▼                      ▼                                    │
//! │  AuthenticationGate      SessionModules (bound at authentication)    │
//! │    challenge/verify        ├─ TopicsService  ─► SubscriptionManager  │
//! │          │                 ├─ RoutingService ─► MeshRoutingEngine    │
//! │          ▼                 └─ RoomService    ─► RoomChannel          │
//! │   SessionRegistry (one session per address)                          │
//! └───────────────────────────────┬──────────────────────────────────────┘
//!                                 │
//!                             TopicBus
//!                    <salt>.peer.<sender>.<topic>
//!                    <salt>.<topic>
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use bff_gateway::{CommsGateway, EcdsaAuthChainVerifier, GatewayConfig};
//!
//! let gateway = CommsGateway::new(config, bus, Arc::new(EcdsaAuthChainVerifier::new()))?;
//! gateway.run(listener, shutdown).await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod auth;
pub mod context;
pub mod domain;
pub mod ports;
pub mod routing;
pub mod rpc;
pub mod service;
pub mod session;

// Re-exports for public API
pub use adapters::EcdsaAuthChainVerifier;
pub use auth::AuthenticationGate;
pub use context::GatewayContext;
pub use domain::address::PeerAddress;
pub use domain::auth_chain::{AuthChain, AuthLink, AuthLinkType};
pub use domain::config::GatewayConfig;
pub use domain::error::{ErrorKind, GatewayError, GatewayResult, RpcError};
pub use domain::types::*;
pub use ports::{SignatureVerifier, VerificationError};
pub use routing::MeshRoutingEngine;
pub use rpc::{ConnectionHandle, FrameBody, RpcFrame, RpcRequest, RpcResponse};
pub use service::CommsGateway;
pub use session::{SessionRegistry, SubscriptionManager};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
