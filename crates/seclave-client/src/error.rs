//! Error types for the room session state machine.
//!
//! Strongly-typed errors, split by how callers recover: protocol-state
//! errors (operation not valid in the current state) leave the session
//! untouched; cryptographic failures on received envelopes are NOT
//! errors - they surface as `DeliverUndecryptable` actions so a bad
//! message can never crash a session.

use thiserror::Error;

use seclave_crypto::CryptoError;

/// Errors from room session operations.
///
/// Every variant leaves the session state unchanged.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Operation not valid in the current session state
    #[error("invalid state: cannot {operation} while {state}")]
    InvalidState {
        /// Operation that was attempted
        operation: &'static str,
        /// Human-readable current state
        state: &'static str,
    },

    /// Encrypt/decrypt attempted with no room key set (session not Active)
    #[error("no room key: session is not in an active room")]
    NoRoomKey,

    /// No pending join request with this id
    #[error("unknown join request: {request_id}")]
    UnknownRequest {
        /// The request id that was not found
        request_id: u64,
    },

    /// A pending join request with this id already exists
    #[error("duplicate join request: {request_id}")]
    DuplicateRequest {
        /// The colliding request id
        request_id: u64,
    },

    /// The approved key already belongs to a member - approving twice
    /// never double-adds
    #[error("requester is already a member of the room")]
    AlreadyMember,

    /// A published membership set does not contain our own key, so no
    /// key we derive from it would let us participate
    #[error("published membership at version {version} does not include our key")]
    NotInMembership {
        /// Version of the offending membership snapshot
        version: u64,
    },

    /// Underlying cryptographic failure (derivation contract violation,
    /// malformed key record)
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Wire structure failed to encode or decode
    #[error("wire codec failure: {reason}")]
    Wire {
        /// Reason the CBOR codec rejected the value
        reason: String,
    },
}
