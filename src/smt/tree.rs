//! Sparse Merkle tree engine
//!
//! Lookups walk top-down from the root following the key's path and collect
//! the untaken sibling at every level. Mutations then walk back bottom-up:
//! the stale nodes of the old path are deleted and the rebuilt path is
//! written, both staged in one [`WriteBatch`] that is committed together with
//! the new root.

use super::hasher::{checked_leaf, probe};
use super::proof::{climb, verify_proof, Entry, Proof};
use super::{Blake3Hasher, LeafEntry, NodeHasher, TreeNode};
use crate::model::{
    first_common_prefix_len, last_non_zero_index, Direction, Hash, Key, Path, Value, TREE_DEPTH,
};
use crate::store::{NodeStore, StoreOp, WriteBatch};
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Result of descending the tree along a key's path
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Retrieval {
    /// The key, with its value if present
    pub entry: Entry,
    /// A leaf for a different key found where the path ended
    pub matching_entry: Option<LeafEntry>,
    /// Siblings passed on the way down, shallowest first
    pub sidenodes: Vec<Hash>,
}

/// Summary of a full walk from the root
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub leaves: usize,
    pub internal_nodes: usize,
    /// Deepest leaf level (root = 0)
    pub max_depth: usize,
    /// Stored nodes the walk never reached
    pub unreachable: Vec<Hash>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.unreachable.is_empty()
    }
}

/// A named sparse Merkle tree over a node store
///
/// Mutating operations take `&mut self`: one writer per tree instance.
/// Several instances may share a store as long as their names differ.
pub struct SparseMerkleTree<'a, H: NodeHasher = Blake3Hasher> {
    store: &'a dyn NodeStore,
    hasher: H,
    name: String,
    /// Current root, advanced only after a successful commit
    root: Hash,
}

impl<'a, H: NodeHasher> SparseMerkleTree<'a, H> {
    /// Open the tree `name` in `store`, empty if it was never written
    pub fn open(store: &'a dyn NodeStore, name: impl Into<String>, hasher: H) -> Result<Self> {
        probe(&hasher)?;

        let name = name.into();
        let root = store.get_root(&name)?.unwrap_or(Hash::ZERO);
        let tree = SparseMerkleTree {
            store,
            hasher,
            name,
            root,
        };

        if !root.is_zero() {
            let digest = tree.load_node(&root)?.digest(&tree.hasher);
            if digest != root {
                return Err(Error::Corruption(format!(
                    "root {} of tree '{}' hashes to {}; opened with a different hasher?",
                    root, tree.name, digest
                )));
            }
        }

        debug!(tree = %tree.name, root = %tree.root, "Opened tree");
        Ok(tree)
    }

    pub fn root(&self) -> Hash {
        self.root
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Get the value stored under `key`
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let key = Key::from_hex(key)?;
        Ok(self.retrieve_entry(&key)?.entry.value)
    }

    /// Insert a new entry; fails if `key` is already present
    ///
    /// Returns the new root.
    pub fn add(&mut self, key: &str, value: &str) -> Result<Hash> {
        let key = Key::from_hex(key)?;
        let value = Value::from_hex(value)?;

        let Retrieval {
            entry,
            matching_entry,
            mut sidenodes,
        } = self.retrieve_entry(&key)?;

        if entry.value.is_some() {
            return Err(Error::KeyExists(key.to_string()));
        }

        let path = Path::of(&key);
        let mut batch = WriteBatch::new(self.name.as_str());

        let base = match &matching_entry {
            Some(leaf) => self.leaf_digest(leaf)?,
            None => Hash::ZERO,
        };

        if !sidenodes.is_empty() {
            self.delete_old_nodes(&mut batch, base, &path, &sidenodes)?;
        }

        // Push the colliding leaf down to the level where the two paths
        // split: zero siblings while they agree, then the leaf itself.
        if let Some(leaf) = &matching_entry {
            let matching_path = Path::of(&leaf.key);
            let split = first_common_prefix_len(&path, &matching_path);
            if split >= TREE_DEPTH || split < sidenodes.len() {
                return Err(Error::Corruption(format!(
                    "leaf {} found at depth {} but shares {} path levels with {}",
                    leaf.key,
                    sidenodes.len(),
                    split,
                    key
                )));
            }
            sidenodes.resize(split, Hash::ZERO);
            sidenodes.push(base);
        }

        let leaf = LeafEntry::new(key, value);
        let leaf_digest = self.put_leaf(&mut batch, &leaf)?;
        let root = self.add_new_nodes(&mut batch, leaf_digest, &path, &sidenodes)?;

        debug!(tree = %self.name, key = %leaf.key, depth = sidenodes.len(), "Adding entry");
        self.commit(batch, root)
    }

    /// Replace the value of an existing entry
    ///
    /// The entry keeps its depth; only the digests on its path change.
    pub fn update(&mut self, key: &str, value: &str) -> Result<Hash> {
        let key = Key::from_hex(key)?;
        let value = Value::from_hex(value)?;

        let Retrieval { entry, sidenodes, .. } = self.retrieve_entry(&key)?;
        let Some(old_value) = entry.value else {
            return Err(Error::KeyNotFound(key.to_string()));
        };

        let path = Path::of(&key);
        let mut batch = WriteBatch::new(self.name.as_str());

        let old_digest = checked_leaf(&self.hasher, &key, &old_value)?;
        batch.delete_leaf(old_digest);
        self.delete_old_nodes(&mut batch, old_digest, &path, &sidenodes)?;

        let leaf = LeafEntry::new(key, value);
        let leaf_digest = self.put_leaf(&mut batch, &leaf)?;
        let root = self.add_new_nodes(&mut batch, leaf_digest, &path, &sidenodes)?;

        debug!(tree = %self.name, key = %leaf.key, "Updating entry");
        self.commit(batch, root)
    }

    /// Remove an existing entry
    ///
    /// When the removed leaf's sibling is itself a leaf, that leaf moves up
    /// past every level whose other side is empty, so no internal node is
    /// left holding a single leaf.
    pub fn delete(&mut self, key: &str) -> Result<Hash> {
        let key = Key::from_hex(key)?;

        let Retrieval {
            entry,
            mut sidenodes,
            ..
        } = self.retrieve_entry(&key)?;
        let Some(value) = entry.value else {
            return Err(Error::KeyNotFound(key.to_string()));
        };

        let path = Path::of(&key);
        let mut batch = WriteBatch::new(self.name.as_str());

        let old_digest = checked_leaf(&self.hasher, &key, &value)?;
        batch.delete_leaf(old_digest);

        let root = match sidenodes.last().copied() {
            None => Hash::ZERO,
            Some(sibling) => {
                self.delete_old_nodes(&mut batch, old_digest, &path, &sidenodes)?;

                if sibling.is_zero() {
                    return Err(Error::Corruption(format!(
                        "leaf {} has an empty sibling at depth {}",
                        key,
                        sidenodes.len()
                    )));
                }

                match self.load_node(&sibling)? {
                    TreeNode::Internal { .. } => {
                        self.add_new_nodes(&mut batch, Hash::ZERO, &path, &sidenodes)?
                    }
                    TreeNode::Leaf(_) => {
                        sidenodes.pop();
                        match last_non_zero_index(&sidenodes) {
                            Some(top) => self.add_new_nodes(
                                &mut batch,
                                sibling,
                                &path,
                                &sidenodes[..=top],
                            )?,
                            None => sibling,
                        }
                    }
                }
            }
        };

        debug!(tree = %self.name, key = %key, "Deleting entry");
        self.commit(batch, root)
    }

    /// Descend along `key`'s path collecting side nodes
    pub fn retrieve_entry(&self, key: &Key) -> Result<Retrieval> {
        let path = Path::of(key);
        let mut sidenodes = Vec::new();
        let mut node = self.root;

        while !node.is_zero() {
            match self.load_node(&node)? {
                TreeNode::Leaf(leaf) => {
                    if &leaf.key == key {
                        return Ok(Retrieval {
                            entry: Entry::present(leaf),
                            matching_entry: None,
                            sidenodes,
                        });
                    }
                    return Ok(Retrieval {
                        entry: Entry::absent(key.clone()),
                        matching_entry: Some(leaf),
                        sidenodes,
                    });
                }
                TreeNode::Internal { left, right } => {
                    let level = sidenodes.len();
                    if level >= TREE_DEPTH {
                        return Err(Error::Corruption(format!(
                            "tree '{}' is deeper than {} levels",
                            self.name, TREE_DEPTH
                        )));
                    }
                    let (taken, untaken) = path.direction(level).select(left, right);
                    sidenodes.push(untaken);
                    node = taken;
                }
            }
        }

        Ok(Retrieval {
            entry: Entry::absent(key.clone()),
            matching_entry: None,
            sidenodes,
        })
    }

    /// Build a membership or non-membership proof for `key`
    pub fn create_proof(&self, key: &str) -> Result<Proof> {
        let key = Key::from_hex(key)?;
        let Retrieval {
            entry,
            matching_entry,
            sidenodes,
        } = self.retrieve_entry(&key)?;

        let membership = entry.value.is_some();
        Ok(Proof {
            entry,
            matching_entry,
            sidenodes,
            root: self.root,
            membership,
        })
    }

    /// Verify a proof with this tree's hasher
    ///
    /// The proof is checked against its own root, not this tree's.
    pub fn verify_proof(&self, proof: &Proof) -> bool {
        verify_proof(&self.hasher, proof)
    }

    /// Every entry stored for this tree, ordered by key
    pub fn entries(&self) -> Result<Vec<LeafEntry>> {
        let mut entries: Vec<LeafEntry> = self
            .store
            .nodes(&self.name)?
            .into_iter()
            .filter_map(|(_, node)| match node {
                TreeNode::Leaf(leaf) => Some(leaf),
                TreeNode::Internal { .. } => None,
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Walk the whole tree, re-hashing every node
    ///
    /// Fails on the first node whose content does not match its digest, on a
    /// leaf that is not on its own key's path, and on an internal node that
    /// should have been collapsed. Stored nodes the walk does not reach are
    /// reported, not treated as errors.
    pub fn check_integrity(&self) -> Result<IntegrityReport> {
        let mut report = IntegrityReport::default();
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        if !self.root.is_zero() {
            stack.push((self.root, 0usize, Path::ROOT));
        }

        while let Some((digest, depth, prefix)) = stack.pop() {
            let node = self.load_node(&digest)?;
            let actual = node.digest(&self.hasher);
            if actual != digest {
                return Err(Error::Corruption(format!(
                    "node {} hashes to {}",
                    digest, actual
                )));
            }
            visited.insert(digest);

            match node {
                TreeNode::Leaf(leaf) => {
                    if first_common_prefix_len(&prefix, &Path::of(&leaf.key)) < depth {
                        return Err(Error::Corruption(format!(
                            "leaf {} stored off its path at depth {}",
                            leaf.key, depth
                        )));
                    }
                    report.leaves += 1;
                    report.max_depth = report.max_depth.max(depth);
                }
                TreeNode::Internal { left, right } => {
                    if depth >= TREE_DEPTH {
                        return Err(Error::Corruption(format!(
                            "internal node {} below the last level",
                            digest
                        )));
                    }
                    self.check_compact(&digest, &left, &right)?;
                    report.internal_nodes += 1;

                    for (child, direction) in [(left, Direction::Left), (right, Direction::Right)] {
                        if !child.is_zero() {
                            stack.push((child, depth + 1, prefix.with_direction(depth, direction)));
                        }
                    }
                }
            }
        }

        report.unreachable = self
            .store
            .nodes(&self.name)?
            .into_iter()
            .map(|(digest, _)| digest)
            .filter(|digest| !visited.contains(digest))
            .collect();

        Ok(report)
    }

    // === Internal helpers ===

    /// Fetch a node from whichever namespace holds it
    fn load_node(&self, digest: &Hash) -> Result<TreeNode> {
        let leaf = self.store.get_leaf(&self.name, digest)?;
        let internal = self.store.get_internal(&self.name, digest)?;

        match (leaf, internal) {
            (Some(leaf), None) => Ok(TreeNode::Leaf(leaf)),
            (None, Some((left, right))) => Ok(TreeNode::Internal { left, right }),
            (Some(_), Some(_)) => Err(Error::Corruption(format!(
                "node {} is stored both as a leaf and as an internal node",
                digest
            ))),
            (None, None) => Err(Error::Corruption(format!(
                "node {} missing from tree '{}'",
                digest, self.name
            ))),
        }
    }

    /// An internal node may not have two empty children, nor one leaf and
    /// one empty child
    fn check_compact(&self, digest: &Hash, left: &Hash, right: &Hash) -> Result<()> {
        let lone = match (left.is_zero(), right.is_zero()) {
            (true, true) => {
                return Err(Error::Corruption(format!(
                    "internal node {} has two empty children",
                    digest
                )))
            }
            (true, false) => right,
            (false, true) => left,
            (false, false) => return Ok(()),
        };
        if self.load_node(lone)?.is_leaf() {
            return Err(Error::Corruption(format!(
                "internal node {} holds a single leaf",
                digest
            )));
        }
        Ok(())
    }

    /// Refuse a batch that would leave one digest stored both as a leaf
    /// and as an internal node
    fn check_namespaces(&self, batch: &WriteBatch) -> Result<()> {
        // Digest -> present once the batch is applied
        let mut internals: HashMap<Hash, bool> = HashMap::new();
        let mut leaves: HashMap<Hash, bool> = HashMap::new();
        for op in batch.ops() {
            match op {
                StoreOp::PutInternal { digest, .. } => {
                    internals.insert(*digest, true);
                }
                StoreOp::DeleteInternal(digest) => {
                    internals.insert(*digest, false);
                }
                StoreOp::PutLeaf { digest, .. } => {
                    leaves.insert(*digest, true);
                }
                StoreOp::DeleteLeaf(digest) => {
                    leaves.insert(*digest, false);
                }
                StoreOp::SetRoot(_) => {}
            }
        }

        for (digest, _) in leaves.iter().filter(|(_, present)| **present) {
            let internal = match internals.get(digest) {
                Some(present) => *present,
                None => self.store.get_internal(&self.name, digest)?.is_some(),
            };
            if internal {
                return Err(Error::HashContract(format!(
                    "leaf digest {} is already an internal node of tree '{}'",
                    digest, self.name
                )));
            }
        }

        for (digest, _) in internals.iter().filter(|(_, present)| **present) {
            let leaf = match leaves.get(digest) {
                Some(present) => *present,
                None => self.store.get_leaf(&self.name, digest)?.is_some(),
            };
            if leaf {
                return Err(Error::HashContract(format!(
                    "internal digest {} is already a leaf of tree '{}'",
                    digest, self.name
                )));
            }
        }

        Ok(())
    }

    fn leaf_digest(&self, leaf: &LeafEntry) -> Result<Hash> {
        checked_leaf(&self.hasher, &leaf.key, &leaf.value)
    }

    fn put_leaf(&self, batch: &mut WriteBatch, leaf: &LeafEntry) -> Result<Hash> {
        let digest = self.leaf_digest(leaf)?;
        batch.put_leaf(digest, leaf.key.clone(), leaf.value.clone());
        Ok(digest)
    }

    /// Stage deletion of the internal nodes above `node` on the old path
    fn delete_old_nodes(
        &self,
        batch: &mut WriteBatch,
        node: Hash,
        path: &Path,
        sidenodes: &[Hash],
    ) -> Result<()> {
        climb(&self.hasher, node, path, sidenodes, |digest, _, _| {
            batch.delete_internal(digest)
        })?;
        Ok(())
    }

    /// Stage the rebuilt internal nodes above `node`, returning the new root
    fn add_new_nodes(
        &self,
        batch: &mut WriteBatch,
        node: Hash,
        path: &Path,
        sidenodes: &[Hash],
    ) -> Result<Hash> {
        climb(&self.hasher, node, path, sidenodes, |digest, left, right| {
            batch.put_internal(digest, left, right)
        })
    }

    /// Commit the batch with the new root; the in-memory root follows only
    /// if the store accepted it
    fn commit(&mut self, mut batch: WriteBatch, root: Hash) -> Result<Hash> {
        self.check_namespaces(&batch)?;
        batch.set_root(root);
        let ops = batch.len();
        self.store.commit(batch)?;
        self.root = root;
        debug!(tree = %self.name, ops, root = %root, "Committed mutation");
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smt::Sha256ConcatHasher;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn tree(store: &MemoryStore) -> SparseMerkleTree<'_> {
        SparseMerkleTree::open(store, "test", Blake3Hasher).unwrap()
    }

    #[test]
    fn test_empty_tree() {
        let store = MemoryStore::new();
        let tree = tree(&store);
        assert!(tree.root().is_zero());
        assert_eq!(tree.get("1").unwrap(), None);
    }

    #[test]
    fn test_add_get() {
        let store = MemoryStore::new();
        let mut tree = tree(&store);

        let root = tree.add("2", "a").unwrap();
        assert_eq!(root, tree.root());
        assert!(!root.is_zero());
        assert_eq!(tree.get("2").unwrap().unwrap().as_str(), "a");
        assert_eq!(tree.get("02").unwrap().unwrap().as_str(), "a");
        assert_eq!(tree.get("1").unwrap(), None);
    }

    #[test]
    fn test_add_existing_key_fails() {
        let store = MemoryStore::new();
        let mut tree = tree(&store);
        tree.add("2", "b").unwrap();
        let root = tree.root();

        assert!(matches!(tree.add("2", "a"), Err(Error::KeyExists(_))));
        assert_eq!(tree.root(), root);
        assert_eq!(tree.get("2").unwrap().unwrap().as_str(), "b");
    }

    #[test]
    fn test_missing_key_fails() {
        let store = MemoryStore::new();
        let mut tree = tree(&store);
        tree.add("2", "b").unwrap();
        let root = tree.root();

        assert!(matches!(tree.update("1", "5"), Err(Error::KeyNotFound(_))));
        assert!(matches!(tree.delete("1"), Err(Error::KeyNotFound(_))));
        assert_eq!(tree.root(), root);
    }

    #[test]
    fn test_invalid_hex_rejected() {
        let store = MemoryStore::new();
        let mut tree = tree(&store);

        assert!(matches!(tree.add("zz", "1"), Err(Error::InvalidHex(_))));
        assert!(matches!(tree.add("1", "0x1"), Err(Error::InvalidHex(_))));
        assert!(matches!(tree.get(""), Err(Error::InvalidHex(_))));
        assert!(matches!(tree.create_proof("g"), Err(Error::InvalidHex(_))));
        assert!(tree.root().is_zero());
    }

    #[test]
    fn test_update_keeps_depth() {
        let store = MemoryStore::new();
        let mut tree = tree(&store);
        for key in ["a", "3", "2b", "20", "9", "17"] {
            tree.add(key, key).unwrap();
        }

        let before = tree.create_proof("20").unwrap();
        let old_root = tree.root();
        tree.update("20", "ff").unwrap();
        let after = tree.create_proof("20").unwrap();

        assert_ne!(tree.root(), old_root);
        assert_eq!(before.sidenodes.len(), after.sidenodes.len());
        assert_eq!(tree.get("20").unwrap().unwrap().as_str(), "ff");
        assert!(tree.check_integrity().unwrap().is_clean());
    }

    #[test]
    fn test_split_places_both_leaves_at_divergence() {
        let store = MemoryStore::new();
        let mut tree = tree(&store);

        // 0x0 and 0x100000 agree on their 20 lowest bits
        tree.add("0", "1").unwrap();
        tree.add("100000", "2").unwrap();

        let proof = tree.create_proof("0").unwrap();
        assert_eq!(proof.sidenodes.len(), 21);
        assert!(proof.sidenodes[..20].iter().all(Hash::is_zero));
        assert!(tree.verify_proof(&proof));

        let report = tree.check_integrity().unwrap();
        assert_eq!(report.leaves, 2);
        assert_eq!(report.internal_nodes, 21);
        assert_eq!(report.max_depth, 21);
        assert!(report.is_clean());
    }

    #[test]
    fn test_matching_leaf_deeper_than_split_rejected() {
        let store = MemoryStore::new();
        let mut tree = tree(&store);
        tree.add("0", "1").unwrap();
        tree.add("100000", "2").unwrap();

        // A real proof for 0x200000 ends on leaf 0x0, which shares 21 levels
        let honest = tree.create_proof("200000").unwrap();
        assert_eq!(honest.sidenodes.len(), 21);
        assert!(tree.verify_proof(&honest));

        // Leaf 0x100000 sits at depth 21 but shares only 20 levels with 0x0
        let member = tree.create_proof("100000").unwrap();
        let forged = Proof {
            entry: Entry::absent(Key::from_hex("0").unwrap()),
            matching_entry: Some(LeafEntry::new(
                member.entry.key.clone(),
                member.entry.value.clone().unwrap(),
            )),
            sidenodes: member.sidenodes.clone(),
            root: member.root,
            membership: false,
        };
        assert!(tree.verify_proof(&member));
        assert!(!tree.verify_proof(&forged));
    }

    fn sha256_tree(store: &MemoryStore, count: u64) -> SparseMerkleTree<'_, Sha256ConcatHasher> {
        let mut tree = SparseMerkleTree::open(store, "test", Sha256ConcatHasher).unwrap();
        for i in 1..=count {
            let key = format!("{:x}", i);
            tree.add(&key, &key).unwrap();
        }
        tree
    }

    /// Internal nodes whose text encoding also reads as `key ++ value ++ "1"`
    fn leaf_shaped_internals(store: &MemoryStore) -> Vec<(Hash, Hash)> {
        store
            .nodes("test")
            .unwrap()
            .into_iter()
            .filter_map(|(_, node)| match node {
                TreeNode::Internal { left, right } => {
                    let usable = !left.is_zero()
                        && !right.is_zero()
                        && !left.to_hex().starts_with('0')
                        && right.to_hex().ends_with('1');
                    usable.then_some((left, right))
                }
                TreeNode::Leaf(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_leaf_colliding_with_internal_node_rejected() {
        let mut rejected = 0;

        for count in [32u64, 64, 128, 256] {
            let candidates = {
                let store = MemoryStore::new();
                sha256_tree(&store, count);
                leaf_shaped_internals(&store)
            };

            for (left, right) in candidates {
                let store = MemoryStore::new();
                let mut tree = sha256_tree(&store, count);
                let root = tree.root();
                let nodes = store.node_count();

                // sha256(key ++ value ++ "1") == sha256(hex(left) ++ hex(right))
                let right_hex = right.to_hex();
                match tree.add(&left.to_hex(), &right_hex[..63]) {
                    Err(Error::HashContract(_)) => {
                        rejected += 1;
                        assert_eq!(tree.root(), root);
                        assert_eq!(store.node_count(), nodes);
                        assert_eq!(store.get_root("test").unwrap(), Some(root));
                    }
                    // The colliding node was on the new key's own path and
                    // was replaced in the same batch
                    Ok(_) => {}
                    Err(e) => panic!("unexpected error: {}", e),
                }

                for i in 1..=count {
                    let key = format!("{:x}", i);
                    assert_eq!(tree.get(&key).unwrap().unwrap().as_str(), key);
                }
                assert!(tree.check_integrity().unwrap().is_clean());
            }

            if rejected > 0 {
                break;
            }
        }

        assert!(rejected > 0, "no colliding internal node found");
    }

    #[test]
    fn test_delete_collapses_single_leaf() {
        let store = MemoryStore::new();
        let mut tree = tree(&store);

        tree.add("0", "1").unwrap();
        let alone = tree.root();
        tree.add("100000", "2").unwrap();
        tree.delete("100000").unwrap();

        assert_eq!(tree.root(), alone);
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn test_delete_all_empties_store() {
        let store = MemoryStore::new();
        let mut tree = tree(&store);
        let keys = ["a", "3", "2b", "20", "9", "17", "ff", "100"];
        for key in keys {
            tree.add(key, "01").unwrap();
        }
        for key in keys {
            tree.delete(key).unwrap();
            assert!(tree.check_integrity().unwrap().is_clean());
        }

        assert!(tree.root().is_zero());
        assert_eq!(store.node_count(), 0);
        assert_eq!(store.get_root("test").unwrap(), Some(Hash::ZERO));
    }

    #[test]
    fn test_reopen_resumes_root() {
        let store = MemoryStore::new();
        let root = {
            let mut tree = tree(&store);
            tree.add("abc", "def").unwrap()
        };

        let tree = tree(&store);
        assert_eq!(tree.root(), root);
        assert_eq!(tree.get("abc").unwrap().unwrap().as_str(), "def");
    }

    #[test]
    fn test_reopen_with_other_hasher_is_detected() {
        let store = MemoryStore::new();
        tree(&store).add("abc", "def").unwrap();

        let reopened = SparseMerkleTree::open(&store, "test", Sha256ConcatHasher);
        assert!(matches!(reopened, Err(Error::Corruption(_))));
    }

    #[test]
    fn test_trees_share_a_store() {
        let store = MemoryStore::new();
        let mut a = SparseMerkleTree::open(&store, "a", Blake3Hasher).unwrap();
        let mut b = SparseMerkleTree::open(&store, "b", Blake3Hasher).unwrap();

        a.add("1", "aa").unwrap();
        b.add("1", "aa").unwrap();
        b.add("2", "bb").unwrap();
        a.delete("1").unwrap();

        assert!(a.root().is_zero());
        assert_eq!(b.get("1").unwrap().unwrap().as_str(), "aa");
        assert_eq!(b.entries().unwrap().len(), 2);
        assert!(b.check_integrity().unwrap().is_clean());
    }

    #[test]
    fn test_entries_sorted_by_key() {
        let store = MemoryStore::new();
        let mut tree = tree(&store);
        for key in ["10", "9", "a"] {
            tree.add(key, "00").unwrap();
        }

        let keys: Vec<_> = tree
            .entries()
            .unwrap()
            .into_iter()
            .map(|e| e.key.to_string())
            .collect();
        assert_eq!(keys, vec!["9", "a", "10"]);
    }

    #[test]
    fn test_missing_node_is_corruption() {
        let store = MemoryStore::new();
        let mut tree = tree(&store);
        tree.add("1", "01").unwrap();
        tree.add("2", "02").unwrap();

        // Drop the root node behind the tree's back
        let mut batch = WriteBatch::new("test");
        batch.delete_internal(tree.root());
        store.commit(batch).unwrap();

        assert!(matches!(tree.get("1"), Err(Error::Corruption(_))));
        assert!(matches!(tree.add("3", "03"), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_unreachable_nodes_reported() {
        let store = MemoryStore::new();
        let mut tree = tree(&store);
        tree.add("1", "01").unwrap();

        let stray = Hash::digest(b"stray");
        let mut batch = WriteBatch::new("test");
        batch.put_internal(stray, Hash::ZERO, tree.root());
        store.commit(batch).unwrap();

        let report = tree.check_integrity().unwrap();
        assert_eq!(report.unreachable, vec![stray]);
    }

    /// A store whose commits can be switched off
    struct FlakyStore {
        inner: MemoryStore,
        fail: AtomicBool,
    }

    impl NodeStore for FlakyStore {
        fn get_internal(&self, tree: &str, digest: &Hash) -> Result<Option<(Hash, Hash)>> {
            self.inner.get_internal(tree, digest)
        }

        fn get_leaf(&self, tree: &str, digest: &Hash) -> Result<Option<LeafEntry>> {
            self.inner.get_leaf(tree, digest)
        }

        fn get_root(&self, tree: &str) -> Result<Option<Hash>> {
            self.inner.get_root(tree)
        }

        fn commit(&self, batch: WriteBatch) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Commit("disk full".into()));
            }
            self.inner.commit(batch)
        }

        fn nodes(&self, tree: &str) -> Result<Vec<(Hash, TreeNode)>> {
            self.inner.nodes(tree)
        }

        fn trees(&self) -> Result<Vec<String>> {
            self.inner.trees()
        }
    }

    #[test]
    fn test_failed_commit_keeps_root() {
        let store = FlakyStore {
            inner: MemoryStore::new(),
            fail: AtomicBool::new(false),
        };
        let mut tree = SparseMerkleTree::open(&store, "test", Blake3Hasher).unwrap();
        tree.add("1", "01").unwrap();
        let root = tree.root();
        let nodes = store.inner.node_count();

        store.fail.store(true, Ordering::SeqCst);
        assert!(matches!(tree.add("2", "02"), Err(Error::Commit(_))));
        assert!(matches!(tree.update("1", "ff"), Err(Error::Commit(_))));
        assert!(matches!(tree.delete("1"), Err(Error::Commit(_))));

        assert_eq!(tree.root(), root);
        assert_eq!(store.inner.node_count(), nodes);
        assert_eq!(tree.get("1").unwrap().unwrap().as_str(), "01");

        store.fail.store(false, Ordering::SeqCst);
        tree.add("2", "02").unwrap();
        assert!(tree.check_integrity().unwrap().is_clean());
    }

    struct ZeroLeafHasher;

    impl NodeHasher for ZeroLeafHasher {
        fn hash_internal(&self, left: &Hash, right: &Hash) -> Hash {
            Blake3Hasher.hash_internal(left, right)
        }

        fn hash_leaf(&self, _: &Key, _: &Value) -> Hash {
            Hash::ZERO
        }
    }

    #[test]
    fn test_zero_producing_hasher_rejected() {
        let store = MemoryStore::new();
        let opened = SparseMerkleTree::open(&store, "test", ZeroLeafHasher);
        assert!(matches!(opened, Err(Error::HashContract(_))));
    }
}
