//! Faucet Address Type
//!
//! Canonical payout-address representation: exactly 40 hex characters,
//! stored lowercase. Parsing is pure and idempotent.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Raw byte length of a decoded address (40 hex chars).
pub const ADDRESS_BYTES: usize = 20;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid address format: expected exactly 40 hex characters")]
    InvalidFormat,
}

/// A validated faucet address in canonical (lowercase) form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Parse and normalize a user-supplied address string.
    ///
    /// Accepts exactly 40 hex characters in any case mix, with surrounding
    /// whitespace tolerated. Returns the lowercase canonical form.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();
        if trimmed.len() != ADDRESS_BYTES * 2 {
            return Err(AddressError::InvalidFormat);
        }
        // hex::decode validates the alphabet and even length in one step.
        let bytes = hex::decode(trimmed).map_err(|_| AddressError::InvalidFormat)?;
        debug_assert_eq!(bytes.len(), ADDRESS_BYTES);
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// Canonical lowercase hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_LOWER: &str = "0123456789abcdef0123456789abcdef01234567";

    #[test]
    fn test_parse_valid_lowercase() {
        let addr = Address::parse(VALID_LOWER).unwrap();
        assert_eq!(addr.as_str(), VALID_LOWER);
    }

    #[test]
    fn test_parse_normalizes_case() {
        let mixed = "0123456789ABCDEF0123456789AbCdEf01234567";
        let addr = Address::parse(mixed).unwrap();
        assert_eq!(addr.as_str(), VALID_LOWER);
    }

    #[test]
    fn test_parse_is_idempotent() {
        let once = Address::parse("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA").unwrap();
        let twice = Address::parse(once.as_str()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let addr = Address::parse(&format!("  {VALID_LOWER}\n")).unwrap();
        assert_eq!(addr.as_str(), VALID_LOWER);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let cases = [
            "",
            "   ",
            "abc",
            "0123456789abcdef0123456789abcdef0123456",   // 39 chars
            "0123456789abcdef0123456789abcdef012345678", // 41 chars
            "g123456789abcdef0123456789abcdef01234567",  // non-hex
            "0x23456789abcdef0123456789abcdef01234567",  // 0x prefix not allowed
        ];
        for case in cases {
            assert_eq!(
                Address::parse(case),
                Err(AddressError::InvalidFormat),
                "should reject {case:?}"
            );
        }
    }

    #[test]
    fn test_serde_roundtrip_and_rejection() {
        let addr = Address::parse(VALID_LOWER).unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{VALID_LOWER}\""));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);

        let bad: Result<Address, _> = serde_json::from_str("\"zz\"");
        assert!(bad.is_err());
    }
}
