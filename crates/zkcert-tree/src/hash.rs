//! field hashing for the binary tree
//!
//! the tree only needs a deterministic 2-to-1 hash over the scalar field.
//! order matters: hash(a, b) != hash(b, a) in general.

use crate::error::{Result, TreeError};
use ark_ff::PrimeField;
use light_poseidon::{Poseidon, PoseidonHasher as _};
use sha3::{Digest, Keccak256};
use zkcert_field::Fr;

/// domain string whose keccak256 (mod p) marks an empty leaf
pub const EMPTY_LEAF_DOMAIN: &[u8] = b"Galactica";

/// canonical empty leaf: keccak256("Galactica") reduced mod p
pub fn empty_leaf() -> Fr {
    Fr::from_be_bytes_mod_order(&Keccak256::digest(EMPTY_LEAF_DOMAIN))
}

/// 2-to-1 hash over the scalar field
pub trait FieldHasher {
    fn hash(&mut self, left: Fr, right: Fr) -> Result<Fr>;
}

/// poseidon with circom parameters (t = 3), matching the certificate circuits
pub struct PoseidonHash {
    inner: Poseidon<Fr>,
}

impl PoseidonHash {
    pub fn new() -> Result<Self> {
        let inner = Poseidon::<Fr>::new_circom(2).map_err(|e| TreeError::Hash(e.to_string()))?;
        Ok(Self { inner })
    }
}

impl FieldHasher for PoseidonHash {
    fn hash(&mut self, left: Fr, right: Fr) -> Result<Fr> {
        self.inner
            .hash(&[left, right])
            .map_err(|e| TreeError::Hash(e.to_string()))
    }
}

impl std::fmt::Debug for PoseidonHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PoseidonHash(circom, t=3)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zkcert_field::fr_from_decimal;

    #[test]
    fn test_poseidon_matches_circomlib() {
        // circomlibjs poseidon([1, 2])
        let mut hasher = PoseidonHash::new().unwrap();
        let h = hasher.hash(Fr::from(1u64), Fr::from(2u64)).unwrap();
        let expected = fr_from_decimal(
            "7853200120776062878684798364095072458815029376092732009249414926327459813530",
        )
        .unwrap();
        assert_eq!(h, expected);
    }

    #[test]
    fn test_poseidon_is_order_sensitive() {
        let mut hasher = PoseidonHash::new().unwrap();
        let a = Fr::from(123u64);
        let b = Fr::from(456u64);
        assert_eq!(hasher.hash(a, b).unwrap(), hasher.hash(a, b).unwrap());
        assert_ne!(hasher.hash(a, b).unwrap(), hasher.hash(b, a).unwrap());
    }

    #[test]
    fn test_empty_leaf_is_stable() {
        assert_eq!(empty_leaf(), empty_leaf());
        assert_ne!(empty_leaf(), Fr::from(0u64));
    }
}
