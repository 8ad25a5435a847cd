//! # Record Format
//!
//! Binary encoding of every value the repository hands to a backend.
//!
//! Format: Header (1 byte) + postcard-serialized record.
//! - 1 byte: Version (`primitives::FORMAT_VERSION`)
//!
//! Backends only ever see the encoded bytes; they never interpret them.
//!
//! ## Validation
//!
//! Size and header are checked before the payload is deserialized, so a
//! corrupted record fails fast instead of allocating.

use crate::{LrsError, primitives};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Maximum accepted size of one encoded record (64 MB).
pub const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

/// Length of the record header.
const HEADER_SIZE: usize = 1;

/// Encode a value as a versioned record.
pub fn encode_record<T: Serialize>(value: &T) -> Result<Vec<u8>, LrsError> {
    let payload =
        postcard::to_stdvec(value).map_err(|e| LrsError::SerializationError(e.to_string()))?;
    if payload.len() > MAX_RECORD_SIZE {
        return Err(LrsError::SerializationError(format!(
            "Record size {} bytes exceeds maximum allowed {} bytes",
            payload.len(),
            MAX_RECORD_SIZE
        )));
    }

    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.push(primitives::FORMAT_VERSION);
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decode a versioned record.
pub fn decode_record<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, LrsError> {
    let Some((&version, payload)) = bytes.split_first() else {
        return Err(LrsError::DeserializationError(
            "Record too short: missing header".to_string(),
        ));
    };
    if version != primitives::FORMAT_VERSION {
        return Err(LrsError::DeserializationError(format!(
            "Unsupported record version: {} (expected {})",
            version,
            primitives::FORMAT_VERSION
        )));
    }
    if payload.len() > MAX_RECORD_SIZE {
        return Err(LrsError::DeserializationError(format!(
            "Record size {} bytes exceeds maximum allowed {} bytes",
            payload.len(),
            MAX_RECORD_SIZE
        )));
    }
    postcard::from_bytes(payload).map_err(|e| LrsError::DeserializationError(e.to_string()))
}

// =============================================================================
// TESTS
// =============================================================================
