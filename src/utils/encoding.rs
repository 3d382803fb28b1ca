use alloy_primitives::{B256, U256};

/// Maximum length of a string stored in a `bytes32` slot (one byte is kept for
/// the terminating zero).
pub const MAX_BYTES32_STRING_LEN: usize = 31;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("String '{0}' does not fit in bytes32")]
    StringTooLong(String),

    #[error("bytes32 value is not a zero-terminated string")]
    MissingTerminator,

    #[error("bytes32 value is not valid UTF-8")]
    InvalidUtf8,

    #[error("Invalid numeric string: '{0}'")]
    InvalidNumber(String),
}

/// Encode a short string as a right-zero-padded `bytes32`.
pub fn format_bytes32_string(value: &str) -> Result<B256, EncodingError> {
    let bytes = value.as_bytes();
    if bytes.len() > MAX_BYTES32_STRING_LEN {
        return Err(EncodingError::StringTooLong(value.to_string()));
    }

    let mut word = [0u8; 32];
    word[..bytes.len()].copy_from_slice(bytes);
    Ok(B256::from(word))
}

/// Decode a right-zero-padded `bytes32` back into a string.
pub fn parse_bytes32_string(word: &B256) -> Result<String, EncodingError> {
    if word.0[31] != 0 {
        return Err(EncodingError::MissingTerminator);
    }

    let len = word.0.iter().position(|b| *b == 0).unwrap_or(32);
    String::from_utf8(word.0[..len].to_vec()).map_err(|_| EncodingError::InvalidUtf8)
}

/// Parse a base-10 string into a 256-bit unsigned integer.
///
/// Only ASCII digits are accepted: no sign, no whitespace, no `0x` prefix.
pub fn parse_decimal_u256(value: &str) -> Result<U256, EncodingError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EncodingError::InvalidNumber(value.to_string()));
    }

    U256::from_str_radix(value, 10).map_err(|_| EncodingError::InvalidNumber(value.to_string()))
}
