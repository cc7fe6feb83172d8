//! # smt_db
//!
//! A persistent sparse Merkle tree keyed by 256-bit hex keys.
//!
//! Every key has a fixed path of 256 left/right directions, but the tree only
//! materializes the nodes it needs: a leaf sits at the shallowest level where
//! no other key shares its path, and empty subtrees are a single zero digest.
//! Each tree produces a root digest that commits to its full contents, and
//! compact proofs of membership or non-membership against that root.
//!
//! ## Core Concepts
//!
//! - **Nodes**: Content-addressed leaves and internal nodes
//! - **Stores**: Where nodes live; in memory or an append-only log file
//! - **Batches**: Every mutation commits atomically along with the new root
//! - **Proofs**: Side nodes along a key's path, verifiable without a store
//!
//! ## Example
//!
//! ```no_run
//! use smt_db::{Blake3Hasher, FileStore, SparseMerkleTree, StoreConfig};
//!
//! # fn main() -> smt_db::Result<()> {
//! let store = FileStore::open_or_create("tree.smt", StoreConfig::default())?;
//! let mut tree = SparseMerkleTree::open(&store, "default", Blake3Hasher)?;
//! tree.add("2b", "beef")?;
//! let proof = tree.create_proof("2b")?;
//! assert!(tree.verify_proof(&proof));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod model;
pub mod smt;
pub mod store;

mod error;

pub use config::{Config, StoreConfig};
pub use error::{Error, Result};
pub use model::{Hash, Key, Value};
pub use smt::{
    verify_proof, Blake3Hasher, Entry, HasherKind, IntegrityReport, LeafEntry, NodeHasher, Proof,
    Sha256ConcatHasher, SparseMerkleTree,
};
pub use store::{FileStore, MemoryStore, NodeStore, WriteBatch};

/// Store file format version
pub const VERSION: u32 = 1;

/// Magic bytes for file identification
pub const MAGIC: &[u8; 8] = b"SMT_TREE";
