//! Domain layer: pure types, errors and configuration.

pub mod address;
pub mod auth_chain;
pub mod config;
pub mod error;
pub mod types;
