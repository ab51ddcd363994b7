//! KZG commitments over BN254
//!
//! The SRS table comes from an external powers-of-tau ceremony and is loaded
//! once; it is never mutated afterwards, so trees share it through `Arc`.
//!
//! commit:  C = sum_i c_i * [tau^i]G1
//! open:    pi = commit((p(X) - p(x)) / (X - x))
//! verify:  e(C - y*G1, G2) == e(pi, [tau]G2 - x*G2)

use crate::{poly, FieldError, Fr, G1Affine, G2Affine, Polynomial, Result};
use ark_bn254::{Bn254, G1Projective, G2Projective};
use ark_ec::{pairing::Pairing, AffineRepr, CurveGroup};
use ark_ff::{BigInteger, One, PrimeField, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// structured reference string: [tau^i]G1 for i in 0..=max_degree plus the
/// two G2 points the pairing check needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Srs {
    g1_powers: Vec<G1Affine>,
    g2: G2Affine,
    g2_tau: G2Affine,
}

/// on-disk layout, compressed points as hex
#[derive(Debug, Serialize, Deserialize)]
struct SrsFile {
    g1_powers: Vec<String>,
    g2: String,
    g2_tau: String,
}

impl Srs {
    pub fn new(g1_powers: Vec<G1Affine>, g2: G2Affine, g2_tau: G2Affine) -> Result<Self> {
        if g1_powers.is_empty() {
            return Err(FieldError::Srs("empty g1 power table".into()));
        }
        Ok(Self { g1_powers, g2, g2_tau })
    }

    /// Build a table from a known secret.
    ///
    /// Anyone holding `tau` can forge openings, so this is only for tests and
    /// local development networks. Production tables come from [`Srs::load`].
    pub fn insecure_from_tau(tau: Fr, max_degree: usize) -> Self {
        let g1 = G1Affine::generator();
        let g2 = G2Affine::generator();

        let mut power = Fr::one();
        let mut projective: Vec<G1Projective> = Vec::with_capacity(max_degree + 1);
        for _ in 0..=max_degree {
            projective.push(g1.mul_bigint(power.into_bigint()));
            power *= tau;
        }

        Self {
            g1_powers: G1Projective::normalize_batch(&projective),
            g2,
            g2_tau: g2.mul_bigint(tau.into_bigint()).into_affine(),
        }
    }

    /// load a ceremony table from its json export
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let file: SrsFile = serde_json::from_str(&raw)?;

        let g1_powers = file
            .g1_powers
            .iter()
            .map(|s| decode_point::<G1Affine>(s))
            .collect::<Result<Vec<_>>>()?;
        let g2 = decode_point::<G2Affine>(&file.g2)?;
        let g2_tau = decode_point::<G2Affine>(&file.g2_tau)?;

        Self::new(g1_powers, g2, g2_tau)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = SrsFile {
            g1_powers: self
                .g1_powers
                .iter()
                .map(encode_point)
                .collect::<Result<Vec<_>>>()?,
            g2: encode_point(&self.g2)?,
            g2_tau: encode_point(&self.g2_tau)?,
        };
        std::fs::write(path.as_ref(), serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    /// highest polynomial degree this table can commit to
    pub fn max_degree(&self) -> usize {
        self.g1_powers.len() - 1
    }

    /// commit to a coefficient vector (low degree first)
    pub fn commit(&self, coeffs: &[Fr]) -> Result<G1Affine> {
        let used = coeffs
            .iter()
            .rposition(|c| !c.is_zero())
            .map(|i| i + 1)
            .unwrap_or(0);
        if used > self.g1_powers.len() {
            return Err(FieldError::DegreeTooLarge {
                degree: used - 1,
                max: self.max_degree(),
            });
        }

        let mut acc = G1Projective::zero();
        for (coeff, base) in coeffs[..used].iter().zip(self.g1_powers.iter()) {
            if coeff.is_zero() {
                continue;
            }
            acc += base.mul_bigint(coeff.into_bigint());
        }
        Ok(acc.into_affine())
    }

    pub fn commit_poly(&self, poly: &Polynomial) -> Result<G1Affine> {
        self.commit(&poly.coeffs)
    }

    /// evaluation p(x) and the opening proof for it
    pub fn open(&self, poly: &Polynomial, x: Fr) -> Result<(Fr, G1Affine)> {
        let (y, q) = poly::quotient(poly, x);
        Ok((y, self.commit_poly(&q)?))
    }

    /// pairing check that `commitment` opens to `y` at `x`
    pub fn verify(&self, commitment: &G1Affine, x: Fr, y: Fr, proof: &G1Affine) -> bool {
        let g1 = self.g1_powers[0];

        let lhs_g1 = (commitment.into_group() - g1.mul_bigint(y.into_bigint())).into_affine();
        let rhs_g2: G2Projective = self.g2_tau.into_group() - self.g2.mul_bigint(x.into_bigint());

        Bn254::pairing(lhs_g1, self.g2) == Bn254::pairing(*proof, rhs_g2.into_affine())
    }
}

/// X coordinate of a commitment, reduced into the scalar field
///
/// this is the value a verkle node contributes to its parent's polynomial.
/// the identity point maps to zero.
pub fn commitment_to_field(point: &G1Affine) -> Fr {
    match point.xy() {
        Some((x, _)) => Fr::from_be_bytes_mod_order(&x.into_bigint().to_bytes_be()),
        None => Fr::zero(),
    }
}

fn encode_point<P: CanonicalSerialize>(point: &P) -> Result<String> {
    let mut bytes = Vec::new();
    point.serialize_compressed(&mut bytes)?;
    Ok(hex::encode(bytes))
}

fn decode_point<P: CanonicalDeserialize>(s: &str) -> Result<P> {
    let bytes = hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| FieldError::Srs(format!("bad point hex: {}", e)))?;
    Ok(P::deserialize_compressed(&bytes[..])?)
}

/// serde adapter: G1 point as compressed hex
pub mod serde_g1 {
    use super::*;
    use serde::{de::Error as _, ser::Error as _, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(point: &G1Affine, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode_point(point).map_err(S::Error::custom)?)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<G1Affine, D::Error> {
        let s = String::deserialize(deserializer)?;
        decode_point(&s).map_err(D::Error::custom)
    }
}

/// serde adapter: list of G1 points as compressed hex
pub mod serde_g1_vec {
    use super::*;
    use serde::{de::Error as _, ser::Error as _, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(points: &[G1Affine], serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let encoded = points
            .iter()
            .map(encode_point)
            .collect::<Result<Vec<_>>>()
            .map_err(S::Error::custom)?;
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<G1Affine>, D::Error> {
        let strings = Vec::<String>::deserialize(deserializer)?;
        strings
            .iter()
            .map(|s| decode_point(s).map_err(D::Error::custom))
            .collect()
    }
}
