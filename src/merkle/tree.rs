//! Fixed-depth, append-only binary Merkle tree.
//!
//! The tree caches every filled node per level so that an insertion only touches the path from
//! the new leaf to the root, and so that membership paths can be produced for any leaf. Positions
//! that have not been filled yet hash as the precomputed empty-subtree roots from
//! [`zero_hashes`](super::hasher::zero_hashes).

use super::hasher::{hash_pair, zero_hashes};

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Largest supported depth (2^32 leaves).
pub const MAX_TREE_DEPTH: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MerkleTreeError {
    #[error("Leaf {0} already exists in the tree")]
    DuplicateLeaf(U256),

    #[error("Tree is full ({capacity} leaves)")]
    TreeFull { capacity: u64 },

    #[error("Invalid tree depth {0}, expected 1..=32")]
    InvalidDepth(usize),
}

/// Result of a successful insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insertion {
    pub root: U256,
    pub index: u64,
}

/// Membership path of a single leaf against the root it was produced for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf: U256,
    pub index: u64,
    /// Sibling hashes from the leaf level upwards.
    pub siblings: Vec<U256>,
    /// 0 when the path node is a left child, 1 when it is a right child.
    pub path_indices: Vec<u8>,
    pub root: U256,
}

impl MerkleProof {
    /// Recompute the root from the leaf and siblings and compare it with `root`.
    #[cfg(test)]
    pub fn verify(&self) -> bool {
        if self.siblings.len() != self.path_indices.len() {
            return false;
        }

        let computed = self
            .siblings
            .iter()
            .zip(&self.path_indices)
            .fold(self.leaf, |node, (sibling, bit)| {
                if *bit == 0 {
                    hash_pair(&node, sibling)
                } else {
                    hash_pair(sibling, &node)
                }
            });

        computed == self.root
    }
}

#[derive(Debug, Clone)]
pub struct IncrementalMerkleTree {
    depth: usize,
    zeros: Vec<U256>,
    /// Filled nodes per level, `nodes[0]` being the leaves.
    nodes: Vec<Vec<U256>>,
    positions: HashMap<U256, u64>,
    root: U256,
    /// `roots[n]` is the root the tree had while holding `n` leaves.
    roots: Vec<U256>,
}

impl IncrementalMerkleTree {
    /// Create an empty tree of the given depth.
    pub fn new(depth: usize) -> Result<Self, MerkleTreeError> {
        if depth == 0 || depth > MAX_TREE_DEPTH {
            return Err(MerkleTreeError::InvalidDepth(depth));
        }

        let zeros = zero_hashes(depth);
        let root = zeros[depth];

        Ok(Self {
            depth,
            zeros,
            nodes: vec![Vec::new(); depth + 1],
            positions: HashMap::new(),
            root,
            roots: vec![root],
        })
    }

    /// Rebuild a tree by inserting `leaves` in order.
    #[cfg(test)]
    pub fn from_leaves<I>(depth: usize, leaves: I) -> Result<Self, MerkleTreeError>
    where
        I: IntoIterator<Item = U256>,
    {
        let mut tree = Self::new(depth)?;
        for leaf in leaves {
            tree.insert(leaf)?;
        }
        Ok(tree)
    }

    /// Compute the root of `leaves` level by level, without any cached state.
    ///
    /// Uniqueness is not checked.
    #[cfg(test)]
    pub fn compute_root(depth: usize, leaves: &[U256]) -> Result<U256, MerkleTreeError> {
        if depth == 0 || depth > MAX_TREE_DEPTH {
            return Err(MerkleTreeError::InvalidDepth(depth));
        }
        let capacity = 1u64 << depth;
        if leaves.len() as u64 > capacity {
            return Err(MerkleTreeError::TreeFull { capacity });
        }

        let zeros = zero_hashes(depth);
        let mut layer = leaves.to_vec();
        for zero in zeros.iter().take(depth) {
            layer = layer
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(zero)))
                .collect();
        }

        Ok(layer.first().copied().unwrap_or(zeros[depth]))
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    pub fn size(&self) -> u64 {
        self.nodes[0].len() as u64
    }

    pub fn is_full(&self) -> bool {
        self.size() >= self.capacity()
    }

    pub fn root(&self) -> U256 {
        self.root
    }

    pub fn contains(&self, leaf: &U256) -> bool {
        self.positions.contains_key(leaf)
    }

    pub fn index_of(&self, leaf: &U256) -> Option<u64> {
        self.positions.get(leaf).copied()
    }

    /// Number of leaves the tree held when its root was `root`, if it ever was.
    ///
    /// When the same root occurs more than once the latest size is returned.
    pub fn size_for_root(&self, root: &U256) -> Option<u64> {
        self.roots
            .iter()
            .rposition(|known| known == root)
            .map(|size| size as u64)
    }

    #[cfg(test)]
    pub fn is_known_root(&self, root: &U256) -> bool {
        self.size_for_root(root).is_some()
    }

    /// Check that `leaf` could be inserted without modifying the tree.
    pub fn ensure_insertable(&self, leaf: &U256) -> Result<(), MerkleTreeError> {
        if self.contains(leaf) {
            return Err(MerkleTreeError::DuplicateLeaf(*leaf));
        }
        if self.is_full() {
            return Err(MerkleTreeError::TreeFull {
                capacity: self.capacity(),
            });
        }
        Ok(())
    }

    /// Append a leaf at the next free index and update the path to the root.
    pub fn insert(&mut self, leaf: U256) -> Result<Insertion, MerkleTreeError> {
        self.ensure_insertable(&leaf)?;

        let index = self.size();
        self.nodes[0].push(leaf);
        self.positions.insert(leaf, index);

        let mut position = index as usize;
        let mut current = leaf;
        for level in 0..self.depth {
            let sibling = self.nodes[level]
                .get(position ^ 1)
                .copied()
                .unwrap_or(self.zeros[level]);

            current = if position & 1 == 0 {
                hash_pair(&current, &sibling)
            } else {
                hash_pair(&sibling, &current)
            };

            position >>= 1;
            let parents = &mut self.nodes[level + 1];
            if position < parents.len() {
                parents[position] = current;
            } else {
                parents.push(current);
            }
        }

        self.root = current;
        self.roots.push(current);

        Ok(Insertion {
            root: current,
            index,
        })
    }

    /// Membership path for the leaf at `index` against the current root.
    pub fn proof(&self, index: u64) -> Option<MerkleProof> {
        let leaf = *self.nodes[0].get(index as usize)?;

        let mut siblings = Vec::with_capacity(self.depth);
        let mut path_indices = Vec::with_capacity(self.depth);
        let mut position = index as usize;
        for level in 0..self.depth {
            siblings.push(
                self.nodes[level]
                    .get(position ^ 1)
                    .copied()
                    .unwrap_or(self.zeros[level]),
            );
            path_indices.push((position & 1) as u8);
            position >>= 1;
        }

        Some(MerkleProof {
            leaf,
            index,
            siblings,
            path_indices,
            root: self.root,
        })
    }
}
