//! Transport-safe binary↔text codec.
//!
//! Every binary value that crosses the process boundary (public keys,
//! ciphertext, nonces) passes through this codec. Standard base64 with
//! padding so a record produced here matches what other implementations
//! of the protocol emit.
//!
//! Round-trip law: `decode(&encode(b)) == b` for all byte sequences,
//! including empty input.

use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::error::CryptoError;

/// Encode bytes as base64 text.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode base64 text back into bytes.
///
/// # Errors
///
/// - `CryptoError::Codec` if the text is not valid standard base64
pub fn decode(text: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD.decode(text).map_err(|e| CryptoError::Codec { reason: e.to_string() })
}
