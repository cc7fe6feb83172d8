//! Node stores
//!
//! A [`NodeStore`] maps node digests to node contents for any number of
//! named trees, plus one root per tree. Leaves and internal nodes live in
//! separate namespaces. All writes go through a [`WriteBatch`], which a
//! store applies atomically: readers see the state before or after a
//! commit, never a mix.

mod batch;
mod file_store;
mod memory;
mod record;

pub use batch::{StoreOp, WriteBatch};
pub use file_store::FileStore;
pub use memory::MemoryStore;
pub use record::{Record, RecordKind};

use crate::model::Hash;
use crate::smt::{LeafEntry, TreeNode};
use crate::Result;

/// Storage backend for sparse Merkle trees
pub trait NodeStore: Send + Sync {
    /// Children of an internal node
    fn get_internal(&self, tree: &str, digest: &Hash) -> Result<Option<(Hash, Hash)>>;

    /// Entry held by a leaf
    fn get_leaf(&self, tree: &str, digest: &Hash) -> Result<Option<LeafEntry>>;

    /// Persisted root of `tree`, if one was ever committed
    fn get_root(&self, tree: &str) -> Result<Option<Hash>>;

    /// Apply every operation of `batch` in order, or none of them
    fn commit(&self, batch: WriteBatch) -> Result<()>;

    /// Every node stored for `tree`, for diagnostics
    fn nodes(&self, tree: &str) -> Result<Vec<(Hash, TreeNode)>>;

    /// Names of all trees with a root or nodes in this store
    fn trees(&self) -> Result<Vec<String>>;
}

impl<S: NodeStore + ?Sized> NodeStore for std::sync::Arc<S> {
    fn get_internal(&self, tree: &str, digest: &Hash) -> Result<Option<(Hash, Hash)>> {
        (**self).get_internal(tree, digest)
    }

    fn get_leaf(&self, tree: &str, digest: &Hash) -> Result<Option<LeafEntry>> {
        (**self).get_leaf(tree, digest)
    }

    fn get_root(&self, tree: &str) -> Result<Option<Hash>> {
        (**self).get_root(tree)
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        (**self).commit(batch)
    }

    fn nodes(&self, tree: &str) -> Result<Vec<(Hash, TreeNode)>> {
        (**self).nodes(tree)
    }

    fn trees(&self) -> Result<Vec<String>> {
        (**self).trees()
    }
}
