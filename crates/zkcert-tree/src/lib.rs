//! commitment trees for zk-certificate registries
//!
//! two fixed-depth accumulators sharing one proof-generation contract:
//! - [`SparseMerkleTree`]: binary, poseidon hashed, O(depth) hashes per proof
//! - [`VerkleTree`]: width-W, KZG committed, log_W(n) levels per proof at the
//!   price of W-point interpolation and commitments per level
//!
//! both store nodes sparsely per level; anything never written resolves to a
//! precomputed empty-subtree value, so the root is a pure function of the
//! populated leaves. revocation overwrites a leaf with [`empty_leaf`] rather
//! than removing it.

pub mod error;
pub mod hash;
pub mod sparse;
pub mod verkle;

pub use error::{Result, TreeError};
pub use hash::{empty_leaf, FieldHasher, PoseidonHash};
pub use sparse::{compute_root, MerkleProof, SparseMerkleTree};
pub use verkle::{VerkleProof, VerkleTree};

use zkcert_field::Fr;

/// common surface of both tree constructions
pub trait CommitmentTree {
    type Proof;

    fn depth(&self) -> usize;

    /// number of leaf slots
    fn capacity(&self) -> u64;

    fn root(&self) -> Fr;

    /// stored node value, or the empty-subtree value for the level
    fn retrieve_leaf(&self, level: usize, index: u64) -> Result<Fr>;

    /// write `values[i]` at `indices[i]` and rebuild every touched path
    fn insert_leaves(&mut self, values: &[Fr], indices: &[u64]) -> Result<()>;

    fn create_proof(&self, index: u64) -> Result<Self::Proof>;

    fn free_leaf_index(&self) -> Result<u64>;

    /// lowest populated index holding `value`
    fn leaf_index(&self, value: &Fr) -> Option<u64>;
}

/// Next index for a new leaf.
///
/// Walks the occupied indices in order: 0 if slot 0 is free, otherwise the
/// first hole directly after an occupied run, otherwise one past the highest
/// occupied index. Tombstoned slots count as occupied.
pub fn free_leaf_index(populated: impl IntoIterator<Item = u64>, capacity: u64) -> Result<u64> {
    let mut indices: Vec<u64> = populated.into_iter().collect();
    indices.sort_unstable();
    indices.dedup();

    let candidate = match indices.first() {
        None => 0,
        Some(&first) if first != 0 => 0,
        Some(_) => indices
            .windows(2)
            .find(|w| w[1] - w[0] >= 2)
            .map(|w| w[0] + 1)
            .unwrap_or_else(|| indices[indices.len() - 1] + 1),
    };

    if candidate >= capacity {
        return Err(TreeError::TreeFull { capacity });
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_index_empty_and_leading_gap() {
        assert_eq!(free_leaf_index(vec![], 8).unwrap(), 0);
        assert_eq!(free_leaf_index(vec![3, 4], 8).unwrap(), 0);
    }

    #[test]
    fn test_free_index_contiguous_and_holes() {
        let mut occupied: Vec<u64> = (0..=10).collect();
        assert_eq!(free_leaf_index(occupied.clone(), 1 << 10).unwrap(), 11);

        occupied.extend([11, 12, 14]);
        assert_eq!(free_leaf_index(occupied, 1 << 10).unwrap(), 13);
    }

    #[test]
    fn test_free_index_full() {
        assert!(matches!(
            free_leaf_index(0..4, 4),
            Err(TreeError::TreeFull { capacity: 4 })
        ));
    }
}
