//! Room key derivation from the membership public-key set.
//!
//! Every member runs the same pure function over the same published
//! membership set and arrives at the same symmetric key, with no key
//! material ever crossing the wire.

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::{error::CryptoError, identity::PublicKeyRecord};

/// Size of a derived room key in bytes (AES-256).
pub const ROOM_KEY_SIZE: usize = 32;

/// Short opaque identifier for a room, doubling as the public salt in
/// key derivation.
///
/// Normalized to upper-case ASCII exactly once at construction so every
/// member feeds byte-identical salt into the derivation regardless of
/// how the code was typed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Normalize and wrap a room code.
    pub fn new(code: &str) -> Self {
        Self(code.trim().to_ascii_uppercase())
    }

    /// The normalized code text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Symmetric room key shared by all current members.
///
/// Valid until the next membership change or room closure. Never
/// persisted, never transmitted; zeroized on drop.
#[derive(Clone)]
pub struct RoomKey {
    key: [u8; ROOM_KEY_SIZE],
}

impl RoomKey {
    /// Raw key bytes for the AEAD cipher.
    pub fn as_bytes(&self) -> &[u8; ROOM_KEY_SIZE] {
        &self.key
    }
}

impl Drop for RoomKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl PartialEq for RoomKey {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for RoomKey {}

impl fmt::Debug for RoomKey {
    // Never print key material
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomKey").finish_non_exhaustive()
    }
}

/// Derive the symmetric room key for a membership set.
///
/// 1. Deduplicate and sort the member key records lexicographically.
/// 2. Concatenate the room code followed by the sorted records.
/// 3. SHA-256 the concatenation; the 32-byte digest IS the AES-256-GCM
///    key (no further KDF stretching).
///
/// Pure function: two independent computations over an identical set
/// yield a bit-identical key, regardless of the order keys were
/// supplied in.
///
/// # Security
///
/// All inputs are public (room code, public keys), so this scheme gives
/// *consistency*, not secrecy, against an observer who collected them.
/// A deployment wanting secrecy from the relay should substitute a
/// pairwise agreement built on [`crate::KeyPair::diffie_hellman`]; the
/// session layer is agnostic to how the key is produced.
///
/// # Errors
///
/// - `CryptoError::EmptyMembership` if no keys were supplied (a room
///   always contains at least its creator)
pub fn derive_room_key(
    room_code: &RoomCode,
    member_keys: &[PublicKeyRecord],
) -> Result<RoomKey, CryptoError> {
    let sorted: BTreeSet<&str> = member_keys.iter().map(PublicKeyRecord::as_str).collect();
    if sorted.is_empty() {
        return Err(CryptoError::EmptyMembership);
    }

    let mut hasher = Sha256::new();
    hasher.update(room_code.as_str().as_bytes());
    for record in &sorted {
        hasher.update(record.as_bytes());
    }

    Ok(RoomKey { key: hasher.finalize().into() })
}
