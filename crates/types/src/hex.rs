//! Hex-quantity parsing for upstream JSON-RPC payloads.
//!
//! The upstream node encodes integer quantities as `0x`-prefixed hex strings
//! (`"0x1b4"` for 436). These helpers parse them into `u64` and provide serde
//! modules for fields that arrive in that encoding.

use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Error parsing a hex-encoded quantity.
#[derive(Debug, Error)]
pub enum HexParseError {
    /// The value did not carry the `0x` prefix.
    #[error("missing 0x prefix in quantity: {0:?}")]
    MissingPrefix(String),
    /// The digits after the prefix were not valid hex.
    #[error("invalid hex digits in quantity: {0:?}")]
    InvalidDigits(String),
}

/// Parse a `0x`-prefixed hex quantity into a `u64`.
pub fn parse_hex_u64(s: &str) -> Result<u64, HexParseError> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .ok_or_else(|| HexParseError::MissingPrefix(s.to_string()))?;
    u64::from_str_radix(digits, 16).map_err(|_| HexParseError::InvalidDigits(s.to_string()))
}

/// Serde module for mandatory `u64` fields encoded as hex quantities.
pub mod u64_quantity {
    use super::*;

    /// Deserialize a `0x`-prefixed hex string into a `u64`.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_hex_u64(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde module for optional `u64` fields encoded as hex quantities.
///
/// Absent or `null` fields deserialize to `None`; present fields must parse.
pub mod opt_u64_quantity {
    use super::*;

    /// Deserialize an optional `0x`-prefixed hex string.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(s) => parse_hex_u64(&s).map(Some).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_u64() {
        assert_eq!(parse_hex_u64("0x0").unwrap(), 0);
        assert_eq!(parse_hex_u64("0x1b4").unwrap(), 436);
        assert_eq!(parse_hex_u64("0xffffffffffffffff").unwrap(), u64::MAX);
    }

    #[test]
    fn test_parse_hex_u64_rejects_missing_prefix() {
        assert!(matches!(
            parse_hex_u64("1b4"),
            Err(HexParseError::MissingPrefix(_))
        ));
    }

    #[test]
    fn test_parse_hex_u64_rejects_bad_digits() {
        assert!(matches!(
            parse_hex_u64("0xzz"),
            Err(HexParseError::InvalidDigits(_))
        ));
    }
}
