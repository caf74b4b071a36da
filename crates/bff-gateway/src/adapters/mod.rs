//! Adapters implementing the outbound ports.

pub mod auth_chain_verifier;

pub use auth_chain_verifier::EcdsaAuthChainVerifier;
