//! zkcert-field: scalar field and polynomial commitment primitives
//!
//! everything here works over the BN254 scalar field, the field the
//! certificate circuits are written in:
//! - decimal / bytes32 conversions with reduction checks
//! - lagrange interpolation over the points 0..n and quotient division
//! - KZG commit / open / verify against a ceremony SRS table

pub mod convert;
pub mod error;
pub mod kzg;
pub mod poly;

pub use convert::{fr_from_bytes32, fr_from_decimal, fr_to_bytes32, fr_to_decimal};
pub use error::{FieldError, Result};
pub use kzg::{commitment_to_field, Srs};
pub use poly::{interpolate, quotient};

/// scalar field of the certificate circuits
pub type Fr = ark_bn254::Fr;

/// commitment group
pub type G1Affine = ark_bn254::G1Affine;

/// verifier group
pub type G2Affine = ark_bn254::G2Affine;

/// coefficient form polynomial over [`Fr`]
pub type Polynomial = ark_poly::univariate::DensePolynomial<Fr>;
