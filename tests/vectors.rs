//! Known-answer tests for the SHA-256 hex-concatenation hasher
//!
//! Roots here were produced by an independent implementation of the same
//! node encoding, so they pin down the path convention, the hash inputs and
//! the deletion compaction all at once.
//!
//! Run with:
//! ```bash
//! cargo test --test vectors
//! ```

use smt_db::{
    FileStore, Hash, MemoryStore, NodeStore, Sha256ConcatHasher, SparseMerkleTree, StoreConfig,
};
use tempfile::tempdir;

const SIX_KEYS: [&str; 6] = ["a", "3", "2b", "20", "9", "17"];
const SIX_KEYS_ROOT: &str = "40770450d00520bdab58e115dd4439c20cd39028252f3973e81fb15b02eb28f7";
const AFTER_DELETE_ROOT: &str = "5d2bfda7c24d9e9e59fe89a271f7d0a3435892c98bc1121b9b590d800deeca10";
const UPDATED_ROOT: &str = "c75d3f1f5bcd6914d0331ce5ec17c0db8f2070a2d4285f8e3ff11c6ca19168ff";

fn hash(hex: &str) -> Hash {
    Hash::from_hex(hex).unwrap()
}

fn insert_all(store: &dyn NodeStore, keys: &[&str]) -> Hash {
    let mut tree = SparseMerkleTree::open(store, "vectors", Sha256ConcatHasher).unwrap();
    for key in keys {
        tree.add(key, key).unwrap();
    }
    tree.root()
}

// ============================================================================
// Memory store
// ============================================================================

#[test]
fn test_six_key_root() {
    let store = MemoryStore::new();
    assert_eq!(insert_all(&store, &SIX_KEYS), hash(SIX_KEYS_ROOT));
}

#[test]
fn test_delete_three_keys() {
    let store = MemoryStore::new();
    let mut tree = SparseMerkleTree::open(&store, "vectors", Sha256ConcatHasher).unwrap();
    for key in SIX_KEYS {
        tree.add(key, key).unwrap();
    }

    for key in ["3", "20", "9"] {
        tree.delete(key).unwrap();
    }

    assert_eq!(tree.root(), hash(AFTER_DELETE_ROOT));
    assert_eq!(store.node_count(), 6);
    assert!(tree.check_integrity().unwrap().is_clean());
}

#[test]
fn test_surviving_keys_in_any_order() {
    let orders = [
        ["a", "2b", "17"],
        ["a", "17", "2b"],
        ["2b", "a", "17"],
        ["2b", "17", "a"],
        ["17", "a", "2b"],
        ["17", "2b", "a"],
    ];
    for order in orders {
        let store = MemoryStore::new();
        assert_eq!(
            insert_all(&store, &order),
            hash(AFTER_DELETE_ROOT),
            "order {:?}",
            order
        );
    }
}

#[test]
fn test_single_leaf_update() {
    let store = MemoryStore::new();
    let mut tree = SparseMerkleTree::open(&store, "vectors", Sha256ConcatHasher).unwrap();

    tree.add("2", "a").unwrap();
    let root = tree.update("2", "5").unwrap();

    assert_eq!(root, hash(UPDATED_ROOT));
    assert_eq!(store.node_count(), 1);
}

#[test]
fn test_proofs_against_reference_root() {
    let store = MemoryStore::new();
    insert_all(&store, &SIX_KEYS);
    let tree = SparseMerkleTree::open(&store, "vectors", Sha256ConcatHasher).unwrap();

    for key in SIX_KEYS {
        let proof = tree.create_proof(key).unwrap();
        assert!(proof.membership);
        assert_eq!(proof.root, hash(SIX_KEYS_ROOT));
        assert!(tree.verify_proof(&proof), "membership proof for {}", key);
    }

    for key in ["0", "1", "b", "2a", "ff", "123456"] {
        let proof = tree.create_proof(key).unwrap();
        assert!(!proof.membership);
        assert!(tree.verify_proof(&proof), "non-membership proof for {}", key);
    }
}

// ============================================================================
// File store
// ============================================================================

#[test]
fn test_vectors_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vectors.smt");

    {
        let store = FileStore::create(&path, StoreConfig::default()).unwrap();
        assert_eq!(insert_all(&store, &SIX_KEYS), hash(SIX_KEYS_ROOT));
    }

    {
        let store = FileStore::open(&path, StoreConfig::default()).unwrap();
        let mut tree = SparseMerkleTree::open(&store, "vectors", Sha256ConcatHasher).unwrap();
        assert_eq!(tree.root(), hash(SIX_KEYS_ROOT));

        for key in ["3", "20", "9"] {
            tree.delete(key).unwrap();
        }
        assert_eq!(tree.root(), hash(AFTER_DELETE_ROOT));
    }

    let store = FileStore::open(&path, StoreConfig::default()).unwrap();
    assert_eq!(store.node_count(), 6);
    let tree = SparseMerkleTree::open(&store, "vectors", Sha256ConcatHasher).unwrap();
    assert_eq!(tree.root(), hash(AFTER_DELETE_ROOT));
    assert_eq!(tree.get("2b").unwrap().unwrap().as_str(), "2b");
    assert_eq!(tree.get("20").unwrap(), None);
}

#[test]
fn test_vectors_survive_compaction() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vectors.smt");

    let store = FileStore::create(&path, StoreConfig::default()).unwrap();
    {
        let mut tree = SparseMerkleTree::open(&store, "vectors", Sha256ConcatHasher).unwrap();
        for key in SIX_KEYS {
            tree.add(key, key).unwrap();
        }
        for key in ["3", "20", "9"] {
            tree.delete(key).unwrap();
        }
    }

    let before = store.log_size();
    let reclaimed = store.compact().unwrap();
    assert!(reclaimed > 0);
    assert_eq!(store.log_size(), before - reclaimed);
    drop(store);

    let store = FileStore::open(&path, StoreConfig::default()).unwrap();
    let tree = SparseMerkleTree::open(&store, "vectors", Sha256ConcatHasher).unwrap();
    assert_eq!(tree.root(), hash(AFTER_DELETE_ROOT));
    assert!(tree.check_integrity().unwrap().is_clean());
}
