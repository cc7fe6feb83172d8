//! Write batches: the staged operations of one tree mutation

use crate::model::{Hash, Key, Value};
use serde::{Deserialize, Serialize};

/// A single staged store operation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreOp {
    PutInternal { digest: Hash, left: Hash, right: Hash },
    PutLeaf { digest: Hash, key: Key, value: Value },
    DeleteInternal(Hash),
    DeleteLeaf(Hash),
    SetRoot(Hash),
}

/// Ordered operations against one named tree, applied all-or-nothing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBatch {
    tree: String,
    ops: Vec<StoreOp>,
}

impl WriteBatch {
    /// Create an empty batch for `tree`
    pub fn new(tree: impl Into<String>) -> Self {
        WriteBatch {
            tree: tree.into(),
            ops: Vec::new(),
        }
    }

    pub fn put_internal(&mut self, digest: Hash, left: Hash, right: Hash) {
        self.ops.push(StoreOp::PutInternal {
            digest,
            left,
            right,
        });
    }

    pub fn put_leaf(&mut self, digest: Hash, key: Key, value: Value) {
        self.ops.push(StoreOp::PutLeaf { digest, key, value });
    }

    pub fn delete_internal(&mut self, digest: Hash) {
        self.ops.push(StoreOp::DeleteInternal(digest));
    }

    pub fn delete_leaf(&mut self, digest: Hash) {
        self.ops.push(StoreOp::DeleteLeaf(digest));
    }

    pub fn set_root(&mut self, root: Hash) {
        self.ops.push(StoreOp::SetRoot(root));
    }

    /// Name of the tree this batch targets
    pub fn tree(&self) -> &str {
        &self.tree
    }

    pub fn ops(&self) -> &[StoreOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The root this batch sets, if any (last one wins)
    pub fn new_root(&self) -> Option<Hash> {
        self.ops.iter().rev().find_map(|op| match op {
            StoreOp::SetRoot(root) => Some(*root),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_keeps_order() {
        let a = Hash::digest(b"a");
        let b = Hash::digest(b"b");
        let mut batch = WriteBatch::new("t");
        batch.delete_internal(a);
        batch.put_internal(a, b, Hash::ZERO);
        batch.set_root(a);

        assert_eq!(batch.tree(), "t");
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.ops()[0], StoreOp::DeleteInternal(a));
        assert_eq!(batch.new_root(), Some(a));
    }

    #[test]
    fn test_empty_batch() {
        let batch = WriteBatch::new("t");
        assert!(batch.is_empty());
        assert_eq!(batch.new_root(), None);
    }
}
