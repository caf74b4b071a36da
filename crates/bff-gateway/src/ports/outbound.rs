//! Outbound ports (driven side).

use crate::domain::address::PeerAddress;
use crate::domain::auth_chain::AuthChain;
use async_trait::async_trait;

/// Reasons an auth chain is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("malformed auth chain: {0}")]
    Malformed(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("link {index} signed by {actual}, expected {expected}")]
    SignerMismatch {
        index: usize,
        expected: PeerAddress,
        actual: PeerAddress,
    },

    #[error("ephemeral key expired")]
    Expired,

    #[error("signed payload does not match the issued challenge")]
    ChallengeMismatch,

    #[error("unsupported link type: {0}")]
    Unsupported(String),
}

/// Verifies that a chain proves control of its signer address and signs the
/// given challenge.
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    /// Validate `chain` against `challenge`.
    async fn verify(&self, challenge: &str, chain: &AuthChain) -> Result<(), VerificationError>;
}
