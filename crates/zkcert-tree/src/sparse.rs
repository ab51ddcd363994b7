//! Sparse binary Merkle tree
//!
//! Mirrors the registry's on-chain tree off-chain so proofs can be produced
//! without touching the ledger. The ledger keeps the authoritative root and
//! updates it incrementally; this side rebuilds every path touched by a batch.
//!
//! Structure:
//! - level 0 holds leaves, level `depth` holds the root
//! - each level is a sparse map index -> value
//! - a missing node resolves to `empty_branches[level]`, where
//!   empty_branches[0] = empty_leaf and empty_branches[i] = H(e[i-1], e[i-1])

use crate::error::{Result, TreeError};
use crate::hash::{empty_leaf, FieldHasher};
use crate::{free_leaf_index, CommitmentTree};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use zkcert_field::convert::{serde_decimal, serde_decimal_vec};
use zkcert_field::Fr;

/// largest supported depth (indices are u64)
pub const MAX_DEPTH: usize = 63;

/// inclusion proof in the layout the certificate circuits consume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    #[serde(with = "serde_decimal")]
    pub leaf: Fr,
    /// sibling values from leaf level up to the root's children
    #[serde(with = "serde_decimal_vec")]
    pub path_elements: Vec<Fr>,
    /// bit `level` is set when the path node at that level is a right child
    pub path_indices: u64,
    #[serde(with = "serde_decimal")]
    pub root: Fr,
}

impl MerkleProof {
    /// leaf position; in a binary tree the direction bits are the index
    pub fn leaf_index(&self) -> u64 {
        self.path_indices
    }

    /// recompute the root from the path and compare with the claimed one
    pub fn verify<H: FieldHasher>(&self, hasher: &mut H) -> Result<bool> {
        let computed = compute_root(hasher, self.leaf, self.path_indices, &self.path_elements)?;
        Ok(computed == self.root)
    }
}

/// fold a leaf up its authentication path
pub fn compute_root<H: FieldHasher>(
    hasher: &mut H,
    leaf: Fr,
    index: u64,
    siblings: &[Fr],
) -> Result<Fr> {
    let mut current = leaf;
    for (level, sibling) in siblings.iter().enumerate() {
        current = if (index >> level) & 1 == 0 {
            hasher.hash(current, *sibling)?
        } else {
            hasher.hash(*sibling, current)?
        };
    }
    Ok(current)
}

/// fixed-depth sparse Merkle tree over a 2-to-1 field hash
#[derive(Debug)]
pub struct SparseMerkleTree<H> {
    depth: usize,
    hasher: H,
    /// levels[l] maps index -> node value, levels[0] are the leaves
    levels: Vec<HashMap<u64, Fr>>,
    empty_branches: Vec<Fr>,
}

impl<H: FieldHasher> SparseMerkleTree<H> {
    /// Create an empty tree of `depth` levels above the leaves.
    pub fn new(depth: usize, mut hasher: H) -> Result<Self> {
        if depth == 0 || depth > MAX_DEPTH {
            return Err(TreeError::InvalidShape(format!(
                "depth {} not in 1..={}",
                depth, MAX_DEPTH
            )));
        }

        let mut empty_branches = Vec::with_capacity(depth + 1);
        empty_branches.push(empty_leaf());
        for level in 1..=depth {
            let below = empty_branches[level - 1];
            empty_branches.push(hasher.hash(below, below)?);
        }

        Ok(Self {
            depth,
            hasher,
            levels: vec![HashMap::new(); depth + 1],
            empty_branches,
        })
    }

    /// value of an all-empty subtree rooted at `level`
    pub fn empty_branch(&self, level: usize) -> Option<Fr> {
        self.empty_branches.get(level).copied()
    }

    /// number of leaf slots ever written, tombstones included
    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    /// populated leaves in index order
    pub fn leaves(&self) -> Vec<(u64, Fr)> {
        let mut leaves: Vec<(u64, Fr)> = self.levels[0].iter().map(|(i, v)| (*i, *v)).collect();
        leaves.sort_unstable_by_key(|(i, _)| *i);
        leaves
    }

    /// hasher used for node hashing, for verifying proofs against this tree
    pub fn hasher_mut(&mut self) -> &mut H {
        &mut self.hasher
    }

    fn check_bounds(&self, level: usize, index: u64) -> Result<()> {
        if level > self.depth || index >= 1u64 << (self.depth - level) {
            return Err(TreeError::OutOfBounds { level, index });
        }
        Ok(())
    }

    /// unchecked lookup with empty fallback
    fn node(&self, level: usize, index: u64) -> Fr {
        self.levels[level]
            .get(&index)
            .copied()
            .unwrap_or(self.empty_branches[level])
    }
}

impl<H: FieldHasher> CommitmentTree for SparseMerkleTree<H> {
    type Proof = MerkleProof;

    fn depth(&self) -> usize {
        self.depth
    }

    fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    fn root(&self) -> Fr {
        self.node(self.depth, 0)
    }

    fn retrieve_leaf(&self, level: usize, index: u64) -> Result<Fr> {
        self.check_bounds(level, index)?;
        Ok(self.node(level, index))
    }

    fn insert_leaves(&mut self, values: &[Fr], indices: &[u64]) -> Result<()> {
        if values.len() != indices.len() {
            return Err(TreeError::LengthMismatch {
                values: values.len(),
                indices: indices.len(),
            });
        }
        for index in indices {
            self.check_bounds(0, *index)?;
        }

        for (value, index) in values.iter().zip(indices) {
            self.levels[0].insert(*index, *value);
        }

        // rebuild every ancestor of a touched leaf, one level at a time
        let mut touched: BTreeSet<u64> = indices.iter().copied().collect();
        for level in 0..self.depth {
            let parents: BTreeSet<u64> = touched.iter().map(|i| i >> 1).collect();
            for parent in &parents {
                let left = self.node(level, parent << 1);
                let right = self.node(level, (parent << 1) | 1);
                let hash = self.hasher.hash(left, right)?;
                self.levels[level + 1].insert(*parent, hash);
            }
            touched = parents;
        }

        Ok(())
    }

    fn create_proof(&self, index: u64) -> Result<MerkleProof> {
        self.check_bounds(0, index)?;

        let mut path_elements = Vec::with_capacity(self.depth);
        let mut path_indices = 0u64;
        let mut current = index;

        for level in 0..self.depth {
            if current & 1 == 0 {
                path_elements.push(self.node(level, current + 1));
            } else {
                path_elements.push(self.node(level, current - 1));
                path_indices |= 1 << level;
            }
            current >>= 1;
        }

        Ok(MerkleProof {
            leaf: self.node(0, index),
            path_elements,
            path_indices,
            root: self.root(),
        })
    }

    fn free_leaf_index(&self) -> Result<u64> {
        free_leaf_index(self.levels[0].keys().copied(), self.capacity())
    }

    fn leaf_index(&self, value: &Fr) -> Option<u64> {
        self.levels[0]
            .iter()
            .filter(|(_, v)| *v == value)
            .map(|(i, _)| *i)
            .min()
    }
}
