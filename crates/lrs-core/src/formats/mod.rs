//! # Formats
//!
//! Byte-level encodings shared by all backends.

pub mod record;

pub use record::{MAX_RECORD_SIZE, decode_record, encode_record};
