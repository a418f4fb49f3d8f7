//! Message encryption using AES-256-GCM.
//!
//! All functions are pure - random bytes must be provided by the caller.
//! This enables deterministic testing and keeps the session state machine
//! free of IO.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use serde::{Deserialize, Serialize};

use crate::{codec, derivation::RoomKey, error::CryptoError};

/// Size of the AES-GCM nonce in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;

/// An encrypted message, self-contained for decryption given the
/// correct room key.
///
/// Both fields are codec-encoded text so the envelope can cross the
/// process boundary as-is. Sender and timestamp metadata ride outside
/// the envelope (and outside the AEAD tag) at the wire layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// Ciphertext including the 16-byte GCM tag, base64 encoded.
    pub ciphertext: String,
    /// The 12-byte nonce, base64 encoded.
    pub nonce: String,
}

/// Encrypt plaintext under a room key.
///
/// The caller provides a fresh nonce per call and MUST source it from a
/// cryptographically secure RNG in production: nonce reuse under the
/// same key breaks both confidentiality and integrity of AES-GCM.
pub fn encrypt(key: &RoomKey, plaintext: &str, nonce_bytes: [u8; NONCE_SIZE]) -> EncryptedEnvelope {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let Ok(ciphertext) = cipher.encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
    else {
        unreachable!("AES-256-GCM encryption cannot fail with valid inputs");
    };

    EncryptedEnvelope { ciphertext: codec::encode(&ciphertext), nonce: codec::encode(&nonce_bytes) }
}

/// Decrypt an envelope under a room key.
///
/// Decryption with any key other than the exact key used to encrypt
/// fails deterministically, as does any bit flip in ciphertext or nonce.
///
/// # Errors
///
/// - `CryptoError::Codec` if either field is not valid base64
/// - `CryptoError::InvalidNonce` if the nonce is not 12 bytes
/// - `CryptoError::DecryptionFailed` on authentication failure or
///   non-UTF-8 plaintext
pub fn decrypt(key: &RoomKey, envelope: &EncryptedEnvelope) -> Result<String, CryptoError> {
    let ciphertext = codec::decode(&envelope.ciphertext)?;
    let nonce_bytes = codec::decode(&envelope.nonce)?;

    if nonce_bytes.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidNonce { expected: NONCE_SIZE, actual: nonce_bytes.len() });
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
        .map_err(|_| CryptoError::DecryptionFailed { reason: "authentication failed".to_string() })?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed {
        reason: "plaintext is not valid UTF-8".to_string(),
    })
}
