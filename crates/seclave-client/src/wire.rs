//! Wire structures crossing the relay, CBOR encoded.
//!
//! The relay sees only these structures: ciphertext and metadata. Sender
//! and timestamp ride outside the AEAD tag as passthrough metadata; the
//! session treats them as untrusted display hints.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use seclave_crypto::{EncryptedEnvelope, PublicKeyRecord};

use crate::{error::SessionError, membership::Member};

/// An encrypted message as it crosses the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Ciphertext and nonce, codec-encoded.
    pub envelope: EncryptedEnvelope,
    /// Sender's username (passthrough metadata, not authenticated).
    pub sender: String,
    /// Milliseconds since the Unix epoch (passthrough metadata).
    pub timestamp_ms: u64,
}

/// Full membership snapshot published after every change.
///
/// The relay must deliver this to every member before any message
/// encrypted after the change (key-then-message ordering).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipUpdate {
    /// Room the update applies to.
    pub room_code: String,
    /// Every current member with their public key.
    pub members: Vec<Member>,
    /// Membership version; receivers ignore anything not newer than
    /// what they already applied.
    pub version: u64,
}

/// A join request as delivered to the room owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireJoinRequest {
    /// Unique id for this request; at most one pending decision per id.
    pub request_id: u64,
    /// Requester's display name.
    pub username: String,
    /// Requester's exported public key.
    pub public_key: PublicKeyRecord,
    /// Target room.
    pub room_code: String,
}

/// Encode a wire structure as CBOR bytes.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, SessionError> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)
        .map_err(|e| SessionError::Wire { reason: e.to_string() })?;
    Ok(bytes)
}

/// Decode a wire structure from CBOR bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SessionError> {
    ciborium::de::from_reader(bytes).map_err(|e| SessionError::Wire { reason: e.to_string() })
}
