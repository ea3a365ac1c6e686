//! Base64 transport encoding for header-borne JSON and raw transactions.
//!
//! Payment payloads and settlement responses travel in HTTP headers as
//! `base64(JSON)`. Serialized Solana transactions travel as `base64(bytes)`.

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Failure to decode a base64-wrapped JSON value.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The input was not valid base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The decoded bytes were not the expected JSON document.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encodes raw bytes as standard base64.
#[must_use]
pub fn encode_bytes<T: AsRef<[u8]>>(input: T) -> String {
    BASE64_STANDARD.encode(input.as_ref())
}

/// Decodes standard base64 into raw bytes.
///
/// # Errors
///
/// Returns an error if the input is not valid base64.
pub fn decode_bytes(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64_STANDARD.decode(input.trim())
}

/// Serializes `value` to JSON and wraps it in base64.
///
/// # Errors
///
/// Returns an error if `value` cannot be serialized.
pub fn encode_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(value)?;
    Ok(BASE64_STANDARD.encode(json))
}

/// Unwraps base64 and deserializes the JSON inside.
///
/// # Errors
///
/// Returns [`DecodeError`] if either layer is malformed.
pub fn decode_json<T: DeserializeOwned>(input: &str) -> Result<T, DecodeError> {
    let bytes = decode_bytes(input)?;
    Ok(serde_json::from_slice(&bytes)?)
}
