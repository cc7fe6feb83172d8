//! Sparse Merkle tree: nodes, hashing, the tree engine and proofs

mod hasher;
mod node;
mod proof;
mod tree;

pub use hasher::{Blake3Hasher, HasherKind, NodeHasher, Sha256ConcatHasher, LEAF_MARK};
pub use node::{LeafEntry, TreeNode};
pub use proof::{compute_root, verify_proof, Entry, Proof};
pub use tree::{IntegrityReport, Retrieval, SparseMerkleTree};
