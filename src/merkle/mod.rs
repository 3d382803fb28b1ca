//! Merkle store for group membership.
//!
//! Every group owns one [`IncrementalMerkleTree`] of the process-wide depth. Leaves are identity
//! commitments and the root is what gets anchored on-chain.

/// Node hashing and empty-subtree values
pub mod hasher;
/// Incremental tree with path updates and membership proofs
pub mod tree;

pub use tree::{IncrementalMerkleTree, Insertion, MAX_TREE_DEPTH, MerkleProof, MerkleTreeError};
