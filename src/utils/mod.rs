//!
//! Utility module for the group sync service.
//!
//! Re-exports the encoding helpers shared by the admission boundary and the chain adapter.
/// String and numeric encodings used on the contract boundary
pub mod encoding;

pub use encoding::{EncodingError, format_bytes32_string, parse_bytes32_string, parse_decimal_u256};
