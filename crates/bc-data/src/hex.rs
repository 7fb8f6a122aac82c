//! Hex quantity codec for JSON-RPC numeric fields.
//!
//! Upstream quantities are `0x`-prefixed hex strings of unbounded size. An
//! absent or empty field decodes to zero.

use num_bigint::BigUint;
use num_traits::Zero;

use crate::error::UpstreamError;

/// Decodes a `0x`-prefixed hex quantity.
///
/// `field` names the JSON field for the error message.
///
/// # Errors
/// Returns [`UpstreamError::InvalidHex`] if the prefix is missing, nothing
/// follows it, or a non-hex digit is present.
pub fn decode_quantity(field: &'static str, raw: &str) -> Result<BigUint, UpstreamError> {
    if raw.is_empty() {
        return Ok(BigUint::zero());
    }

    let invalid = || UpstreamError::InvalidHex {
        field,
        value: raw.to_string(),
    };

    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(invalid)?;

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    BigUint::parse_bytes(digits.as_bytes(), 16).ok_or_else(invalid)
}

/// Like [`decode_quantity`] for fields the provider may omit or send as `null`.
pub fn decode_optional_quantity(
    field: &'static str,
    raw: Option<&str>,
) -> Result<BigUint, UpstreamError> {
    decode_quantity(field, raw.unwrap_or_default())
}

/// Encodes a quantity as lowercase `0x` hex. Zero is `0x0`.
pub fn encode_quantity(value: &BigUint) -> String {
    format!("0x{value:x}")
}
