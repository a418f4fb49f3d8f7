//! Participant identity: X25519 key pair, public key records, fingerprints.
//!
//! Each participant generates one key pair per process. The private half
//! never leaves this module and is never serialized; the public half is
//! exported as a canonical base64 [`PublicKeyRecord`] for exchange during
//! room creation and join.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::{codec, error::CryptoError};

/// Size of an X25519 public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Number of digest bytes rendered in a fingerprint.
const FINGERPRINT_OCTETS: usize = 8;

/// A participant's asymmetric key pair.
///
/// The secret half is owned exclusively by this value, has no accessor,
/// and is zeroized on drop (`StaticSecret` zeroizes itself).
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Build a key pair from 32 bytes of caller-provided entropy.
    ///
    /// The caller MUST provide cryptographically secure random bytes in
    /// production (the client's `Environment` does). X25519 clamping is
    /// applied internally, so any 32-byte input yields a valid key.
    pub fn from_entropy(entropy: [u8; 32]) -> Self {
        let secret = StaticSecret::from(entropy);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Export the public key as its canonical text record.
    ///
    /// Deterministic and side-effect-free: the same key pair always
    /// exports the identical record.
    pub fn public_record(&self) -> PublicKeyRecord {
        PublicKeyRecord(codec::encode(self.public.as_bytes()))
    }

    /// Perform X25519 key agreement with a peer's public key record.
    ///
    /// Not used by the membership-hash room key scheme, but kept as the
    /// building block for a pairwise agreement scheme that could replace
    /// it without touching the session state machine.
    pub fn diffie_hellman(&self, peer: &PublicKeyRecord) -> Result<[u8; 32], CryptoError> {
        let peer_key = PublicKey::from(peer.key_bytes()?);
        Ok(*self.secret.diffie_hellman(&peer_key).as_bytes())
    }
}

impl fmt::Debug for KeyPair {
    // Never print secret material
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").field("public", &self.public_record()).finish_non_exhaustive()
    }
}

/// Canonical text encoding of an exported public key.
///
/// Immutable once issued. Ordered by its text encoding, which is the
/// sort order room key derivation uses.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKeyRecord(String);

impl PublicKeyRecord {
    /// Parse a record received from a peer.
    ///
    /// # Errors
    ///
    /// - `CryptoError::Codec` if the text is not valid base64
    /// - `CryptoError::InvalidPublicKey` if it does not decode to exactly
    ///   32 bytes
    pub fn parse(text: &str) -> Result<Self, CryptoError> {
        let bytes = codec::decode(text)?;
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(CryptoError::InvalidPublicKey {
                expected: PUBLIC_KEY_SIZE,
                actual: bytes.len(),
            });
        }
        Ok(Self(text.to_string()))
    }

    /// The canonical text encoding.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic digest for out-of-band human verification.
    ///
    /// SHA-256 over the raw public-key bytes; the first 8 digest bytes
    /// rendered as upper-case hex octets separated by spaces. Same key,
    /// same fingerprint, always - independent of local machine state.
    pub fn fingerprint(&self) -> Result<Fingerprint, CryptoError> {
        let digest = Sha256::digest(self.key_bytes()?);
        let rendered = digest[..FINGERPRINT_OCTETS]
            .iter()
            .map(|byte| format!("{byte:02X}"))
            .collect::<Vec<_>>()
            .join(" ");
        Ok(Fingerprint(rendered))
    }

    /// Decode back to raw key bytes.
    fn key_bytes(&self) -> Result<[u8; PUBLIC_KEY_SIZE], CryptoError> {
        let bytes = codec::decode(&self.0)?;
        bytes.try_into().map_err(|bytes: Vec<u8>| CryptoError::InvalidPublicKey {
            expected: PUBLIC_KEY_SIZE,
            actual: bytes.len(),
        })
    }
}

impl fmt::Display for PublicKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Human-verifiable digest of a public key.
///
/// Rendered as 8 upper-case hex octets, e.g. `3F 00 A1 7B 52 C4 09 EE`.
/// Used to detect key substitution out-of-band; purely derived, never
/// stored independently of the key it represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// The rendered fingerprint text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
