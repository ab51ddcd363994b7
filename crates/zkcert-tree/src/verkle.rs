//! Verkle tree: width-W commitment tree over KZG
//!
//! Every inner node commits to the polynomial interpolating its W children's
//! values at x = 0..W-1. A node's value one level up is the X coordinate of
//! that commitment, reduced into the scalar field.
//!
//! Each node also keeps its opening proof at `index % W` inside its parent's
//! polynomial. Those proofs are written while the parent is being built, so
//! they always live "one level up" from the node that owns them.
//!
//! Compared to the binary tree a proof has log_W(n) levels instead of
//! log_2(n), but every level costs an interpolation plus a commitment.

use crate::error::{Result, TreeError};
use crate::hash::empty_leaf;
use crate::{free_leaf_index, CommitmentTree};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use zkcert_field::convert::serde_decimal;
use zkcert_field::kzg::serde_g1_vec;
use zkcert_field::{commitment_to_field, interpolate, Fr, G1Affine, Polynomial, Srs};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// per-level (commitment, opening) pairs from the leaf upwards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerkleProof {
    #[serde(with = "serde_decimal")]
    pub leaf: Fr,
    pub index: u64,
    pub width: usize,
    /// commitment of the parent window at each level, the last one is the root
    #[serde(with = "serde_g1_vec")]
    pub commitments: Vec<G1Affine>,
    /// opening of the path node inside each of those commitments
    #[serde(with = "serde_g1_vec")]
    pub openings: Vec<G1Affine>,
    #[serde(with = "serde_decimal")]
    pub root: Fr,
}

impl VerkleProof {
    /// check every opening against the SRS and that the path ends at `root`
    pub fn verify(&self, srs: &Srs) -> bool {
        if self.commitments.len() != self.openings.len() || self.width < 2 {
            return false;
        }

        let width = self.width as u64;
        let mut value = self.leaf;
        let mut index = self.index;
        for (commitment, opening) in self.commitments.iter().zip(self.openings.iter()) {
            let x = Fr::from(index % width);
            if !srs.verify(commitment, x, value, opening) {
                return false;
            }
            value = commitment_to_field(commitment);
            index /= width;
        }

        index == 0 && value == self.root
    }
}

/// fixed depth, fixed width KZG tree
#[derive(Debug, Clone)]
pub struct VerkleTree {
    depth: usize,
    width: usize,
    capacity: u64,
    srs: Arc<Srs>,
    /// values[l] maps index -> field value, values[0] are the leaves
    values: Vec<HashMap<u64, Fr>>,
    /// commitments[l] for l >= 1, one per inner node
    commitments: Vec<HashMap<u64, G1Affine>>,
    /// openings[l] maps index -> proof of that node inside its parent
    openings: Vec<HashMap<u64, G1Affine>>,
    empty_values: Vec<Fr>,
    empty_commitments: Vec<G1Affine>,
    empty_opening: G1Affine,
}

impl VerkleTree {
    pub fn new(depth: usize, width: usize, srs: Arc<Srs>) -> Result<Self> {
        if depth == 0 || width < 2 {
            return Err(TreeError::InvalidShape(format!(
                "need depth >= 1 and width >= 2, got depth {} width {}",
                depth, width
            )));
        }
        if srs.max_degree() + 1 < width {
            return Err(TreeError::InvalidShape(format!(
                "srs supports degree {}, width {} needs {}",
                srs.max_degree(),
                width,
                width - 1
            )));
        }
        let capacity = u32::try_from(depth)
            .ok()
            .and_then(|d| (width as u64).checked_pow(d))
            .ok_or_else(|| {
                TreeError::InvalidShape(format!("{}^{} leaves overflow u64", width, depth))
            })?;

        // all W children equal -> constant polynomial, zero quotient
        let empty_opening = srs.commit(&[])?;
        let mut empty_values = vec![empty_leaf()];
        let mut empty_commitments = vec![empty_opening];
        for level in 1..=depth {
            let window = vec![empty_values[level - 1]; width];
            let commitment = srs.commit_poly(&interpolate(&window))?;
            empty_commitments.push(commitment);
            empty_values.push(commitment_to_field(&commitment));
        }

        Ok(Self {
            depth,
            width,
            capacity,
            srs,
            values: vec![HashMap::new(); depth + 1],
            commitments: vec![HashMap::new(); depth + 1],
            openings: vec![HashMap::new(); depth + 1],
            empty_values,
            empty_commitments,
            empty_opening,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn srs(&self) -> &Srs {
        &self.srs
    }

    /// commitment at the top of the tree
    pub fn root_commitment(&self) -> G1Affine {
        self.commitment(self.depth, 0)
    }

    /// stored opening of node (level, index) inside its parent, if built
    pub fn opening(&self, level: usize, index: u64) -> Option<G1Affine> {
        self.openings.get(level)?.get(&index).copied()
    }

    /// opening used for nodes of an all-empty window (zero polynomial)
    pub fn empty_opening(&self) -> G1Affine {
        self.empty_opening
    }

    fn level_size(&self, level: usize) -> u64 {
        let mut size = self.capacity;
        for _ in 0..level {
            size /= self.width as u64;
        }
        size
    }

    fn check_bounds(&self, level: usize, index: u64) -> Result<()> {
        if level > self.depth || index >= self.level_size(level) {
            return Err(TreeError::OutOfBounds { level, index });
        }
        Ok(())
    }

    fn value(&self, level: usize, index: u64) -> Fr {
        self.values[level]
            .get(&index)
            .copied()
            .unwrap_or(self.empty_values[level])
    }

    fn commitment(&self, level: usize, index: u64) -> G1Affine {
        self.commitments[level]
            .get(&index)
            .copied()
            .unwrap_or(self.empty_commitments[level])
    }

    /// polynomial through the W children of `parent` at `level + 1`
    fn window_polynomial(&self, level: usize, parent: u64) -> Polynomial {
        let start = parent * self.width as u64;
        let window: Vec<Fr> = (0..self.width as u64)
            .map(|k| self.value(level, start + k))
            .collect();
        interpolate(&window)
    }

    fn child_openings(&self, poly: &Polynomial) -> Result<Vec<G1Affine>> {
        #[cfg(feature = "parallel")]
        let positions = (0..self.width as u64).into_par_iter();
        #[cfg(not(feature = "parallel"))]
        let positions = 0..self.width as u64;

        positions
            .map(|k| {
                self.srs
                    .open(poly, Fr::from(k))
                    .map(|(_, proof)| proof)
                    .map_err(TreeError::from)
            })
            .collect()
    }
}

impl CommitmentTree for VerkleTree {
    type Proof = VerkleProof;

    fn depth(&self) -> usize {
        self.depth
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn root(&self) -> Fr {
        self.value(self.depth, 0)
    }

    fn retrieve_leaf(&self, level: usize, index: u64) -> Result<Fr> {
        self.check_bounds(level, index)?;
        Ok(self.value(level, index))
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
            self.values[0].insert(*index, *value);
        }

        let width = self.width as u64;
        let mut touched: BTreeSet<u64> = indices.iter().copied().collect();
        for level in 0..self.depth {
            let parents: BTreeSet<u64> = touched.iter().map(|i| i / width).collect();
            for parent in &parents {
                let poly = self.window_polynomial(level, *parent);
                let commitment = self.srs.commit_poly(&poly)?;
                let proofs = self.child_openings(&poly)?;

                for (k, proof) in proofs.into_iter().enumerate() {
                    self.openings[level].insert(parent * width + k as u64, proof);
                }
                self.commitments[level + 1].insert(*parent, commitment);
                self.values[level + 1].insert(*parent, commitment_to_field(&commitment));
            }
            touched = parents;
        }

        Ok(())
    }

    fn create_proof(&self, index: u64) -> Result<VerkleProof> {
        self.check_bounds(0, index)?;

        let width = self.width as u64;
        let mut commitments = Vec::with_capacity(self.depth);
        let mut openings = Vec::with_capacity(self.depth);
        let mut current = index;

        // windows are rebuilt from current values, stored openings are not reused
        for level in 0..self.depth {
            let parent = current / width;
            let poly = self.window_polynomial(level, parent);
            commitments.push(self.srs.commit_poly(&poly)?);
            let (_, opening) = self.srs.open(&poly, Fr::from(current % width))?;
            openings.push(opening);
            current = parent;
        }

        Ok(VerkleProof {
            leaf: self.value(0, index),
            index,
            width: self.width,
            commitments,
            openings,
            root: self.root(),
        })
    }

    fn free_leaf_index(&self) -> Result<u64> {
        free_leaf_index(self.values[0].keys().copied(), self.capacity)
    }

    fn leaf_index(&self, value: &Fr) -> Option<u64> {
        self.values[0]
            .iter()
            .filter(|(_, v)| *v == value)
            .map(|(i, _)| *i)
            .min()
    }
}
