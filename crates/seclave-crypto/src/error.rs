//! Error types for cryptographic operations

use thiserror::Error;

/// Errors from cryptographic primitives.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Text value is not valid base64
    #[error("codec failure: {reason}")]
    Codec {
        /// Reason the decode was rejected
        reason: String,
    },

    /// Public key record does not decode to the expected length
    #[error("invalid public key: expected {expected} bytes, got {actual}")]
    InvalidPublicKey {
        /// Expected key length
        expected: usize,
        /// Actual decoded length
        actual: usize,
    },

    /// Room key derivation was attempted over an empty membership set
    /// A room always contains at least its creator
    #[error("cannot derive a room key from an empty membership set")]
    EmptyMembership,

    /// Nonce does not decode to the expected length
    #[error("invalid nonce: expected {expected} bytes, got {actual}")]
    InvalidNonce {
        /// Expected nonce length
        expected: usize,
        /// Actual decoded length
        actual: usize,
    },

    /// Decryption failed (authentication tag mismatch, wrong key, or
    /// tampered ciphertext)
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Reason for decryption failure
        reason: String,
    },
}

impl CryptoError {
    /// Returns true if this error is recoverable at the session boundary.
    ///
    /// Recoverable errors come from untrusted wire input (tampering, stale
    /// keys, malformed text) and are rendered as an "undecryptable"
    /// placeholder. Non-recoverable errors indicate a caller contract
    /// violation.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Untrusted input - render placeholder, keep going
            Self::Codec { .. }
            | Self::InvalidNonce { .. }
            | Self::InvalidPublicKey { .. }
            | Self::DecryptionFailed { .. } => true,

            // Caller violated the membership contract
            Self::EmptyMembership => false,
        }
    }
}
