//! Node hash functions
//!
//! The tree is generic over [`NodeHasher`]. A conforming hasher is pure,
//! deterministic and never returns [`Hash::ZERO`].

use crate::model::{Hash, Key, Value};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Trailing mark appended to leaf encodings by [`Sha256ConcatHasher`]
pub const LEAF_MARK: &str = "1";

/// Textual rendering of the zero node used by [`Sha256ConcatHasher`]
pub const ZERO_RENDERING: &str = "0";

/// Maps node contents to a digest
pub trait NodeHasher {
    /// Digest of an internal node with the given children
    fn hash_internal(&self, left: &Hash, right: &Hash) -> Hash;

    /// Digest of a leaf holding `key` and `value`
    fn hash_leaf(&self, key: &Key, value: &Value) -> Hash;
}

impl<H: NodeHasher + ?Sized> NodeHasher for &H {
    fn hash_internal(&self, left: &Hash, right: &Hash) -> Hash {
        (**self).hash_internal(left, right)
    }

    fn hash_leaf(&self, key: &Key, value: &Value) -> Hash {
        (**self).hash_leaf(key, value)
    }
}

const INTERNAL_TAG: u8 = 0x01;
const LEAF_TAG: u8 = 0x00;

/// BLAKE3 with separate leaf and internal domains
///
/// Leaves hash the tag, the key as a fixed 32-byte integer, then the value
/// text. Internal nodes hash the tag and both 32-byte children.
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3Hasher;

impl NodeHasher for Blake3Hasher {
    fn hash_internal(&self, left: &Hash, right: &Hash) -> Hash {
        Hash::digest_many(&[&[INTERNAL_TAG], left.as_bytes(), right.as_bytes()])
    }

    fn hash_leaf(&self, key: &Key, value: &Value) -> Hash {
        Hash::digest_many(&[&[LEAF_TAG], key.as_bytes(), value.as_str().as_bytes()])
    }
}

/// SHA-256 over the concatenated hex renderings of a node's fields
///
/// Internal: `sha256(render(left) ++ render(right))`, where the zero node
/// renders as `"0"` and any other digest as lowercase hex. Leaf:
/// `sha256(key ++ value ++ "1")`. This is the encoding used by the common
/// JavaScript sparse Merkle tree libraries, so roots are comparable with
/// theirs for lowercase canonical keys.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256ConcatHasher;

impl Sha256ConcatHasher {
    fn render(node: &Hash) -> String {
        if node.is_zero() {
            ZERO_RENDERING.to_string()
        } else {
            node.to_hex()
        }
    }
}

impl NodeHasher for Sha256ConcatHasher {
    fn hash_internal(&self, left: &Hash, right: &Hash) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(Self::render(left).as_bytes());
        hasher.update(Self::render(right).as_bytes());
        Hash::from_bytes(hasher.finalize().into())
    }

    fn hash_leaf(&self, key: &Key, value: &Value) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(key.as_str().as_bytes());
        hasher.update(value.as_str().as_bytes());
        hasher.update(LEAF_MARK.as_bytes());
        Hash::from_bytes(hasher.finalize().into())
    }
}

/// Runtime choice between the bundled hashers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HasherKind {
    #[default]
    Blake3,
    Sha256Concat,
}

impl HasherKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HasherKind::Blake3 => "blake3",
            HasherKind::Sha256Concat => "sha256-concat",
        }
    }
}

impl NodeHasher for HasherKind {
    fn hash_internal(&self, left: &Hash, right: &Hash) -> Hash {
        match self {
            HasherKind::Blake3 => Blake3Hasher.hash_internal(left, right),
            HasherKind::Sha256Concat => Sha256ConcatHasher.hash_internal(left, right),
        }
    }

    fn hash_leaf(&self, key: &Key, value: &Value) -> Hash {
        match self {
            HasherKind::Blake3 => Blake3Hasher.hash_leaf(key, value),
            HasherKind::Sha256Concat => Sha256ConcatHasher.hash_leaf(key, value),
        }
    }
}

impl FromStr for HasherKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "blake3" => Ok(HasherKind::Blake3),
            "sha256-concat" | "sha256" => Ok(HasherKind::Sha256Concat),
            other => Err(format!(
                "unknown hasher '{}', expected 'blake3' or 'sha256-concat'",
                other
            )),
        }
    }
}

impl fmt::Display for HasherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hash an internal node, rejecting a zero result
pub(crate) fn checked_internal<H: NodeHasher + ?Sized>(
    hasher: &H,
    left: &Hash,
    right: &Hash,
) -> Result<Hash> {
    let digest = hasher.hash_internal(left, right);
    if digest.is_zero() {
        return Err(Error::HashContract(format!(
            "internal node ({}, {}) hashed to the zero node",
            left, right
        )));
    }
    Ok(digest)
}

/// Hash a leaf, rejecting a zero result
pub(crate) fn checked_leaf<H: NodeHasher + ?Sized>(
    hasher: &H,
    key: &Key,
    value: &Value,
) -> Result<Hash> {
    let digest = hasher.hash_leaf(key, value);
    if digest.is_zero() {
        return Err(Error::HashContract(format!(
            "leaf ({}, {}) hashed to the zero node",
            key, value
        )));
    }
    Ok(digest)
}

/// Spot-check a hasher on inputs built from the zero node and zero key
pub(crate) fn probe<H: NodeHasher + ?Sized>(hasher: &H) -> Result<()> {
    let zero_key = Key::from_hex("0")?;
    let zero_value = Value::from_hex("0")?;
    let leaf = checked_leaf(hasher, &zero_key, &zero_value)?;
    checked_internal(hasher, &Hash::ZERO, &Hash::ZERO)?;
    checked_internal(hasher, &leaf, &Hash::ZERO)?;
    checked_internal(hasher, &Hash::ZERO, &leaf)?;
    Ok(())
}
