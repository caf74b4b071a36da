//! secp256k1 auth chain verifier.
//!
//! Every signed link is an EIP-191 `personal_sign` signature: the signer is
//! recovered from `keccak256("\x19Ethereum Signed Message:\n" || len || payload)`
//! and compared against the authority established by the previous link.
//!
//! Contract wallets (EIP-1654 links) need an Ethereum provider and are
//! rejected.

use crate::domain::address::{PeerAddress, ADDRESS_LEN};
use crate::domain::auth_chain::{AuthChain, AuthLinkType, EphemeralPayload};
use crate::ports::outbound::{SignatureVerifier, VerificationError};
use async_trait::async_trait;
use chrono::Utc;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest, Keccak256};
use subtle::ConstantTimeEq;
use tracing::debug;

/// Length of an `r || s || v` signature.
pub const SIGNATURE_LEN: usize = 65;

/// Verifier for ECDSA (EOA) auth chains.
#[derive(Debug, Clone, Copy, Default)]
pub struct EcdsaAuthChainVerifier;

impl EcdsaAuthChainVerifier {
    /// Create a new verifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn verify_chain(&self, challenge: &str, chain: &AuthChain) -> Result<(), VerificationError> {
        let links = chain.links();
        let mut authority = chain
            .signer()
            .map_err(|e| VerificationError::Malformed(e.to_string()))?;
        if links.len() < 2 {
            return Err(VerificationError::Malformed(
                "chain has no signed entity".into(),
            ));
        }

        let now = Utc::now();
        let last = links.len() - 1;

        for (index, link) in links.iter().enumerate().skip(1) {
            match link.kind {
                AuthLinkType::Signer => {
                    return Err(VerificationError::Malformed(
                        "SIGNER is only allowed as the first link".into(),
                    ));
                }
                AuthLinkType::EcdsaEphemeral => {
                    if index == last {
                        return Err(VerificationError::Malformed(
                            "chain must end with a signed entity".into(),
                        ));
                    }
                    let signer = recover_signer(&link.payload, &link.signature)?;
                    ensure_signer(index, &authority, signer)?;

                    let ephemeral = EphemeralPayload::parse(&link.payload)
                        .map_err(|e| VerificationError::Malformed(e.to_string()))?;
                    if ephemeral.is_expired(now) {
                        return Err(VerificationError::Expired);
                    }
                    authority = ephemeral.address;
                }
                AuthLinkType::EcdsaSignedEntity => {
                    if index != last {
                        return Err(VerificationError::Malformed(
                            "signed entity must be the last link".into(),
                        ));
                    }
                    let matches: bool = link.payload.as_bytes().ct_eq(challenge.as_bytes()).into();
                    if !matches {
                        return Err(VerificationError::ChallengeMismatch);
                    }
                    let signer = recover_signer(&link.payload, &link.signature)?;
                    ensure_signer(index, &authority, signer)?;
                }
                AuthLinkType::Eip1654Ephemeral | AuthLinkType::Eip1654SignedEntity => {
                    return Err(VerificationError::Unsupported(format!("{:?}", link.kind)));
                }
            }
        }

        debug!(signer = %authority, links = links.len(), "Auth chain verified");
        Ok(())
    }
}

#[async_trait]
impl SignatureVerifier for EcdsaAuthChainVerifier {
    async fn verify(&self, challenge: &str, chain: &AuthChain) -> Result<(), VerificationError> {
        self.verify_chain(challenge, chain)
    }
}

fn ensure_signer(
    index: usize,
    expected: &PeerAddress,
    actual: PeerAddress,
) -> Result<(), VerificationError> {
    if &actual != expected {
        return Err(VerificationError::SignerMismatch {
            index,
            expected: expected.clone(),
            actual,
        });
    }
    Ok(())
}

/// Keccak256 hash function.
#[must_use]
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// EIP-191 hash of a `personal_sign` message.
#[must_use]
pub fn personal_message_hash(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
    hasher.update(message.as_bytes());
    hasher.finalize().into()
}

/// Derive the address of a public key.
#[must_use]
pub fn address_from_key(public_key: &VerifyingKey) -> PeerAddress {
    let pubkey_bytes = public_key.to_encoded_point(false);
    // Keccak256 of the uncompressed key without the 0x04 prefix
    let hash = keccak256(&pubkey_bytes.as_bytes()[1..]);
    let mut address = [0u8; ADDRESS_LEN];
    address.copy_from_slice(&hash[32 - ADDRESS_LEN..]);
    PeerAddress::from_bytes(address)
}

/// Recover the address that produced `signature_hex` over `message`.
pub fn recover_signer(message: &str, signature_hex: &str) -> Result<PeerAddress, VerificationError> {
    let raw = signature_hex.strip_prefix("0x").unwrap_or(signature_hex);
    let bytes = hex::decode(raw)
        .map_err(|e| VerificationError::InvalidSignature(format!("invalid hex: {e}")))?;
    if bytes.len() != SIGNATURE_LEN {
        return Err(VerificationError::InvalidSignature(format!(
            "expected {SIGNATURE_LEN} bytes, got {}",
            bytes.len()
        )));
    }

    let mut recovery_id = parse_recovery_id(bytes[64])?;
    let mut signature = Signature::from_slice(&bytes[..64])
        .map_err(|_| VerificationError::InvalidSignature("invalid r/s".into()))?;

    // High-S signatures are valid for Ethereum wallets; flip to low-S and
    // adjust the recovery parity so recovery still yields the same key.
    if let Some(normalized) = signature.normalize_s() {
        signature = normalized;
        recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
    }

    let hash = personal_message_hash(message);
    let key = VerifyingKey::recover_from_prehash(&hash, &signature, recovery_id)
        .map_err(|_| VerificationError::InvalidSignature("public key recovery failed".into()))?;
    Ok(address_from_key(&key))
}

/// Parse recovery ID from v value.
///
/// Valid v values: 0, 1, 27, 28
fn parse_recovery_id(v: u8) -> Result<RecoveryId, VerificationError> {
    let id = match v {
        0 | 27 => 0,
        1 | 28 => 1,
        _ => {
            return Err(VerificationError::InvalidSignature(format!(
                "invalid recovery id {v}"
            )))
        }
    };
    RecoveryId::try_from(id)
        .map_err(|_| VerificationError::InvalidSignature(format!("invalid recovery id {v}")))
}
