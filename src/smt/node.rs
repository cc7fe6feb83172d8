//! Tree node types

use super::NodeHasher;
use crate::model::{Hash, Key, Value};
use serde::{Deserialize, Serialize};

/// A key/value pair stored in a leaf
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafEntry {
    pub key: Key,
    pub value: Value,
}

impl LeafEntry {
    pub fn new(key: Key, value: Value) -> Self {
        LeafEntry { key, value }
    }
}

/// A node of the sparse Merkle tree
///
/// The zero node is not a variant: an empty subtree is `Hash::ZERO` and has
/// no stored content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeNode {
    /// Two children, each a node digest or the zero node
    Internal { left: Hash, right: Hash },
    /// A key/value entry
    Leaf(LeafEntry),
}

impl TreeNode {
    /// Compute the digest identifying this node
    pub fn digest<H: NodeHasher + ?Sized>(&self, hasher: &H) -> Hash {
        match self {
            TreeNode::Internal { left, right } => hasher.hash_internal(left, right),
            TreeNode::Leaf(entry) => hasher.hash_leaf(&entry.key, &entry.value),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, TreeNode::Leaf(_))
    }
}
