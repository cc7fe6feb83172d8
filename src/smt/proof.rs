//! Membership and non-membership proofs
//!
//! Verification needs only a hasher and the path codec, never a store.

use super::hasher::{checked_internal, checked_leaf};
use super::{LeafEntry, NodeHasher};
use crate::model::{first_common_prefix_len, Hash, Key, Path, Value, TREE_DEPTH};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// The queried key, with its value when it is a member
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub key: Key,
    pub value: Option<Value>,
}

impl Entry {
    pub fn absent(key: Key) -> Self {
        Entry { key, value: None }
    }

    pub fn present(leaf: LeafEntry) -> Self {
        Entry {
            key: leaf.key,
            value: Some(leaf.value),
        }
    }
}

/// A self-contained proof about one key under one root
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub entry: Entry,
    /// Leaf found on the key's path holding a different key
    pub matching_entry: Option<LeafEntry>,
    /// Siblings along the path, shallowest first
    pub sidenodes: Vec<Hash>,
    pub root: Hash,
    pub membership: bool,
}

impl Proof {
    /// Check this proof against its own root
    pub fn verify<H: NodeHasher + ?Sized>(&self, hasher: &H) -> bool {
        verify_proof(hasher, self)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Fold `node` up through `sidenodes`, deepest first
///
/// `on_node` sees every computed internal node as `(digest, left, right)`.
/// Resuming partway up the tree is done by passing a prefix of the side
/// nodes.
pub(crate) fn climb<H, F>(
    hasher: &H,
    mut node: Hash,
    path: &Path,
    sidenodes: &[Hash],
    mut on_node: F,
) -> Result<Hash>
where
    H: NodeHasher + ?Sized,
    F: FnMut(Hash, Hash, Hash),
{
    if sidenodes.len() > TREE_DEPTH {
        return Err(Error::Corruption(format!(
            "{} side nodes exceed the tree depth of {}",
            sidenodes.len(),
            TREE_DEPTH
        )));
    }
    for (level, side) in sidenodes.iter().enumerate().rev() {
        let (left, right) = path.direction(level).arrange(node, *side);
        node = checked_internal(hasher, &left, &right)?;
        on_node(node, left, right);
    }
    Ok(node)
}

/// The root implied by `node` sitting at depth `sidenodes.len()` on `path`
pub fn compute_root<H: NodeHasher + ?Sized>(
    hasher: &H,
    node: Hash,
    path: &Path,
    sidenodes: &[Hash],
) -> Result<Hash> {
    climb(hasher, node, path, sidenodes, |_, _, _| {})
}

/// Verify a membership or non-membership proof
pub fn verify_proof<H: NodeHasher + ?Sized>(hasher: &H, proof: &Proof) -> bool {
    if proof.membership != proof.entry.value.is_some() || proof.sidenodes.len() > TREE_DEPTH {
        return false;
    }

    match &proof.matching_entry {
        None => {
            let start = match &proof.entry.value {
                Some(value) => match checked_leaf(hasher, &proof.entry.key, value) {
                    Ok(digest) => digest,
                    Err(_) => return false,
                },
                None => Hash::ZERO,
            };
            let path = Path::of(&proof.entry.key);
            matches!(
                compute_root(hasher, start, &path, &proof.sidenodes),
                Ok(root) if root == proof.root
            )
        }
        Some(matching) => {
            if proof.membership || matching.key == proof.entry.key {
                return false;
            }

            let Ok(start) = checked_leaf(hasher, &matching.key, &matching.value) else {
                return false;
            };
            let matching_path = Path::of(&matching.key);
            let root_matches = matches!(
                compute_root(hasher, start, &matching_path, &proof.sidenodes),
                Ok(root) if root == proof.root
            );
            if !root_matches {
                return false;
            }

            // The matching leaf must sit no deeper than the point where the
            // two keys' paths diverge, or the queried key could live below it.
            let path = Path::of(&proof.entry.key);
            proof.sidenodes.len() <= first_common_prefix_len(&path, &matching_path)
        }
    }
}
