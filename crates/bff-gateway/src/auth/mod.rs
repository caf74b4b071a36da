//! Connection authentication.

pub mod gate;

pub use gate::AuthenticationGate;
