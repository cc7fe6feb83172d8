//! Hexadecimal keys and values
//!
//! Every key and value entering the tree is validated here, before any
//! traversal starts. Keys are canonicalized (lowercase, no leading zeros) so
//! that two spellings of the same number can never occupy two leaves on the
//! same path.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum significant hex digits in a key (one per 4 path levels)
pub const MAX_KEY_DIGITS: usize = 64;

/// Check that a string is non-empty and made only of hex digits
pub fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn check_hex(s: &str) -> Result<()> {
    if is_hex(s) {
        Ok(())
    } else {
        Err(Error::InvalidHex(format!("{:?} must be a hexadecimal string", s)))
    }
}

/// A tree key: a hex-encoded number of at most 256 bits
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Key {
    // Field order gives numeric ordering.
    bytes: [u8; 32],
    canonical: String,
}

impl Key {
    /// Parse and canonicalize a hex key
    pub fn from_hex(s: &str) -> Result<Self> {
        check_hex(s)?;

        let trimmed = s.trim_start_matches('0');
        if trimmed.len() > MAX_KEY_DIGITS {
            return Err(Error::InvalidHex(format!(
                "key has {} significant digits, at most {} allowed",
                trimmed.len(),
                MAX_KEY_DIGITS
            )));
        }

        let canonical = if trimmed.is_empty() {
            "0".to_string()
        } else {
            trimmed.to_ascii_lowercase()
        };

        let padded = format!("{:0>64}", canonical);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(&padded, &mut bytes)
            .map_err(|e| Error::InvalidHex(format!("{}: {}", s, e)))?;

        Ok(Key { bytes, canonical })
    }

    /// The canonical hex form
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// The key as a 256-bit big-endian integer
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl TryFrom<String> for Key {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Key::from_hex(&s)
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.canonical
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.canonical)
    }
}

/// A tree value: an opaque hex string, stored verbatim
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Value(String);

impl Value {
    /// Validate a hex value
    pub fn from_hex(s: &str) -> Result<Self> {
        check_hex(s)?;
        Ok(Value(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Value {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        check_hex(&s)?;
        Ok(Value(s))
    }
}

impl From<Value> for String {
    fn from(value: Value) -> Self {
        value.0
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({})", self.0)
    }
}
