//! Seclave Client
//!
//! Action-based room session state machine for the Seclave protocol. One
//! session carries one participant through the room lifecycle: create or
//! join a room, arbitrate join requests, rotate the shared room key on
//! every membership change, and seal/open messages under the current key.
//!
//! # Architecture
//!
//! Sans-IO: the session receives events ([`SessionEvent`]), processes
//! them through pure state machine logic, and returns actions
//! ([`SessionAction`]) for the caller to execute. The caller owns all
//! transport and UI concerns.
//!
//! # Ordering contract
//!
//! The room key is a pure function of (room code, membership set), so the
//! caller MUST deliver every membership update to the session before any
//! message that was encrypted after that change. The session enforces
//! monotonicity on its side by versioning membership and ignoring stale
//! snapshots.
//!
//! # Components
//!
//! - [`RoomSession`]: the state machine
//! - [`MembershipSet`]: versioned, sorted membership collection
//! - [`SessionEvent`] / [`SessionAction`]: the event/action vocabulary
//! - [`Environment`]: randomness and wall-clock abstraction
//!   ([`SystemEnv`] in production, `env::test_utils::MockEnv` in tests)
//! - [`wire`]: CBOR structures crossing the relay

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod env;
mod error;
mod event;
mod membership;
mod session;
pub mod wire;

pub use env::{Environment, SystemEnv};
pub use error::SessionError;
pub use event::{SessionAction, SessionEvent};
pub use membership::{Member, MembershipSet};
pub use seclave_crypto::{
    CryptoError, EncryptedEnvelope, Fingerprint, KeyPair, PublicKeyRecord, RoomCode,
};
pub use session::RoomSession;
