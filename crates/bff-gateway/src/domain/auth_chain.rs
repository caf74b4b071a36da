//! Signed authentication chains.
//!
//! A chain starts with the owner's address and delegates authority link by
//! link until the final link signs the server's challenge:
//!
//! ```text
//! SIGNER(owner) ──signs──► ECDSA_EPHEMERAL(ephemeral key, expiry) ──signs──► ECDSA_SIGNED_ENTITY(challenge)
//! ```

use crate::domain::address::PeerAddress;
use crate::domain::error::GatewayError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// First line of an ephemeral delegation payload.
pub const EPHEMERAL_HEADER: &str = "Decentraland Login";
const EPHEMERAL_ADDRESS_PREFIX: &str = "Ephemeral address: ";
const EXPIRATION_PREFIX: &str = "Expiration: ";

/// Kind of a chain link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthLinkType {
    #[serde(rename = "SIGNER")]
    Signer,
    #[serde(rename = "ECDSA_EPHEMERAL")]
    EcdsaEphemeral,
    #[serde(rename = "ECDSA_SIGNED_ENTITY")]
    EcdsaSignedEntity,
    #[serde(rename = "ECDSA_EIP_1654_EPHEMERAL")]
    Eip1654Ephemeral,
    #[serde(rename = "ECDSA_EIP_1654_SIGNED_ENTITY")]
    Eip1654SignedEntity,
}

/// One link of the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthLink {
    #[serde(rename = "type")]
    pub kind: AuthLinkType,
    pub payload: String,
    #[serde(default)]
    pub signature: String,
}

/// An ordered authentication chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthChain(Vec<AuthLink>);

impl AuthChain {
    /// Build a chain from links.
    #[must_use]
    pub fn new(links: Vec<AuthLink>) -> Self {
        Self(links)
    }

    /// Parse the JSON form sent by clients.
    pub fn from_json(json: &str) -> Result<Self, GatewayError> {
        let chain: AuthChain = serde_json::from_str(json)
            .map_err(|e| GatewayError::AuthenticationFailed(format!("malformed auth chain: {e}")))?;
        if chain.0.is_empty() {
            return Err(GatewayError::AuthenticationFailed("empty auth chain".into()));
        }
        Ok(chain)
    }

    /// Serialize to the JSON form.
    pub fn to_json(&self) -> Result<String, GatewayError> {
        serde_json::to_string(self).map_err(|e| GatewayError::InvalidRequest(e.to_string()))
    }

    /// The owner's address from the leading `SIGNER` link.
    pub fn signer(&self) -> Result<PeerAddress, GatewayError> {
        match self.0.first() {
            Some(link) if link.kind == AuthLinkType::Signer => PeerAddress::parse(&link.payload),
            _ => Err(GatewayError::AuthenticationFailed(
                "auth chain must start with a SIGNER link".into(),
            )),
        }
    }

    /// All links in order.
    #[must_use]
    pub fn links(&self) -> &[AuthLink] {
        &self.0
    }
}

/// Payload of an `ECDSA_EPHEMERAL` link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EphemeralPayload {
    pub address: PeerAddress,
    pub expiration: DateTime<Utc>,
}

impl EphemeralPayload {
    /// Parse the multi-line delegation text.
    pub fn parse(payload: &str) -> Result<Self, GatewayError> {
        let mut address = None;
        let mut expiration = None;

        for line in payload.lines().map(str::trim) {
            if let Some(raw) = line.strip_prefix(EPHEMERAL_ADDRESS_PREFIX) {
                address = Some(PeerAddress::parse(raw)?);
            } else if let Some(raw) = line.strip_prefix(EXPIRATION_PREFIX) {
                let parsed = DateTime::parse_from_rfc3339(raw.trim()).map_err(|e| {
                    GatewayError::AuthenticationFailed(format!("invalid expiration: {e}"))
                })?;
                expiration = Some(parsed.with_timezone(&Utc));
            }
        }

        match (address, expiration) {
            (Some(address), Some(expiration)) => Ok(Self {
                address,
                expiration,
            }),
            _ => Err(GatewayError::AuthenticationFailed(
                "ephemeral payload missing address or expiration".into(),
            )),
        }
    }

    /// Render the text an owner signs to delegate to this key.
    #[must_use]
    pub fn to_message(&self) -> String {
        format!(
            "{EPHEMERAL_HEADER}\n{EPHEMERAL_ADDRESS_PREFIX}{}\n{EXPIRATION_PREFIX}{}",
            self.address,
            self.expiration.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }

    /// Whether the delegation has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration <= now
    }
}
