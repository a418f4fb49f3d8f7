//! Seclave Cryptographic Primitives
//!
//! Cryptographic building blocks for Seclave rooms. Pure functions with
//! deterministic outputs. Callers provide random bytes for deterministic
//! testing.
//!
//! # Key Lifecycle
//!
//! Every participant owns one X25519 identity key pair. The public half is
//! exported as a canonical base64 record and exchanged during room
//! creation/join. Whenever the room's membership changes, every member
//! independently derives the same symmetric room key from the membership
//! set. Messages are encrypted under that key with AES-256-GCM.
//!
//! ```text
//! Identity KeyPair (X25519)
//!        │ export
//!        ▼
//! PublicKeyRecord (base64, one per member)
//!        │ sort + concat with room code
//!        ▼
//! SHA-256  →  RoomKey (per membership version)
//!        │
//!        ▼
//! AES-256-GCM  →  EncryptedEnvelope
//! ```
//!
//! # Security
//!
//! Rotation:
//! - Every membership change produces a new room key
//! - Envelopes sealed under a prior key become undecryptable by design
//!
//! Authenticity:
//! - AES-256-GCM provides tamper-proof encryption
//! - Fresh random 96-bit nonce per message; reuse under one key breaks
//!   the AEAD guarantees, so nonces are never derived from message data
//! - Failed authentication tag -> typed decryption failure
//!
//! Caveat:
//! - The room key is a digest over *public* inputs (room code + member
//!   public keys). That gives every member a consistent key but provides
//!   no secrecy against an observer who collected those public values.
//!   See [`derivation::derive_room_key`] for the full caveat and the
//!   pairwise-agreement escape hatch ([`identity::KeyPair::diffie_hellman`]).

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cipher;
pub mod codec;
pub mod derivation;
pub mod error;
pub mod identity;

pub use cipher::{EncryptedEnvelope, NONCE_SIZE, decrypt, encrypt};
pub use derivation::{ROOM_KEY_SIZE, RoomCode, RoomKey, derive_room_key};
pub use error::CryptoError;
pub use identity::{Fingerprint, KeyPair, PUBLIC_KEY_SIZE, PublicKeyRecord};
