//! In-memory node store

use super::{NodeStore, StoreOp, WriteBatch};
use crate::model::Hash;
use crate::smt::{LeafEntry, TreeNode};
use crate::Result;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Nodes and root of one named tree
#[derive(Clone, Debug, Default)]
pub(crate) struct TreeSpace {
    pub internals: HashMap<Hash, (Hash, Hash)>,
    pub leaves: HashMap<Hash, LeafEntry>,
    pub root: Option<Hash>,
}

impl TreeSpace {
    fn is_empty(&self) -> bool {
        self.internals.is_empty() && self.leaves.is_empty() && self.root.is_none()
    }

    /// Re-express this tree's contents as a batch that recreates it
    pub fn to_batch(&self, tree: &str) -> WriteBatch {
        let mut batch = WriteBatch::new(tree);
        for (digest, (left, right)) in &self.internals {
            batch.put_internal(*digest, *left, *right);
        }
        for (digest, entry) in &self.leaves {
            batch.put_leaf(*digest, entry.key.clone(), entry.value.clone());
        }
        if let Some(root) = self.root {
            batch.set_root(root);
        }
        batch
    }
}

/// All trees of a store, keyed by name
#[derive(Clone, Debug, Default)]
pub(crate) struct Namespaces {
    trees: BTreeMap<String, TreeSpace>,
}

impl Namespaces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree(&self, name: &str) -> Option<&TreeSpace> {
        self.trees.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TreeSpace)> {
        self.trees.iter()
    }

    /// Apply a batch in order; infallible once the batch is decoded
    pub fn apply(&mut self, batch: &WriteBatch) {
        let space = self.trees.entry(batch.tree().to_string()).or_default();
        for op in batch.ops() {
            match op {
                StoreOp::PutInternal {
                    digest,
                    left,
                    right,
                } => {
                    space.internals.insert(*digest, (*left, *right));
                }
                StoreOp::PutLeaf { digest, key, value } => {
                    space
                        .leaves
                        .insert(*digest, LeafEntry::new(key.clone(), value.clone()));
                }
                StoreOp::DeleteInternal(digest) => {
                    space.internals.remove(digest);
                }
                StoreOp::DeleteLeaf(digest) => {
                    space.leaves.remove(digest);
                }
                StoreOp::SetRoot(root) => {
                    space.root = Some(*root);
                }
            }
        }
        if space.is_empty() {
            self.trees.remove(batch.tree());
        }
    }

    pub fn get_internal(&self, tree: &str, digest: &Hash) -> Option<(Hash, Hash)> {
        self.tree(tree)?.internals.get(digest).copied()
    }

    pub fn get_leaf(&self, tree: &str, digest: &Hash) -> Option<LeafEntry> {
        self.tree(tree)?.leaves.get(digest).cloned()
    }

    pub fn get_root(&self, tree: &str) -> Option<Hash> {
        self.tree(tree)?.root
    }

    pub fn nodes(&self, tree: &str) -> Vec<(Hash, TreeNode)> {
        let Some(space) = self.tree(tree) else {
            return Vec::new();
        };
        let internals = space
            .internals
            .iter()
            .map(|(digest, (left, right))| {
                (
                    *digest,
                    TreeNode::Internal {
                        left: *left,
                        right: *right,
                    },
                )
            });
        let leaves = space
            .leaves
            .iter()
            .map(|(digest, entry)| (*digest, TreeNode::Leaf(entry.clone())));
        let mut nodes: Vec<_> = internals.chain(leaves).collect();
        nodes.sort_by_key(|(digest, _)| *digest);
        nodes
    }

    pub fn names(&self) -> Vec<String> {
        self.trees.keys().cloned().collect()
    }

    pub fn node_count(&self) -> usize {
        self.trees
            .values()
            .map(|space| space.internals.len() + space.leaves.len())
            .sum()
    }
}

/// A node store held entirely in memory
///
/// Commits apply under a single write lock, so concurrent readers observe
/// whole batches only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<Namespaces>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of nodes across all trees
    pub fn node_count(&self) -> usize {
        self.state.read().node_count()
    }
}

impl NodeStore for MemoryStore {
    fn get_internal(&self, tree: &str, digest: &Hash) -> Result<Option<(Hash, Hash)>> {
        Ok(self.state.read().get_internal(tree, digest))
    }

    fn get_leaf(&self, tree: &str, digest: &Hash) -> Result<Option<LeafEntry>> {
        Ok(self.state.read().get_leaf(tree, digest))
    }

    fn get_root(&self, tree: &str) -> Result<Option<Hash>> {
        Ok(self.state.read().get_root(tree))
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.state.write().apply(&batch);
        Ok(())
    }

    fn nodes(&self, tree: &str) -> Result<Vec<(Hash, TreeNode)>> {
        Ok(self.state.read().nodes(tree))
    }

    fn trees(&self) -> Result<Vec<String>> {
        Ok(self.state.read().names())
    }
}
