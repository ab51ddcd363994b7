//! polynomial helpers over the scalar field
//!
//! interpolation domain is always the small integers 0..n, which is what the
//! verkle tree uses to place a node's children inside its polynomial.

use crate::{Fr, Polynomial};
use ark_ff::{batch_inversion, One, Zero};
use ark_poly::univariate::DenseOrSparsePolynomial;
use ark_poly::{DenseUVPolynomial, Polynomial as _};

/// coefficients of the unique degree-(n-1) polynomial through (i, values[i])
pub fn interpolate(values: &[Fr]) -> Polynomial {
    let n = values.len();
    if n == 0 {
        return Polynomial::from_coefficients_vec(vec![]);
    }

    // Z(X) = (X - 0)(X - 1)...(X - (n-1)), low degree first
    let mut vanishing = vec![Fr::one()];
    for j in 0..n {
        let point = Fr::from(j as u64);
        let mut next = vec![Fr::zero(); vanishing.len() + 1];
        for (k, c) in vanishing.iter().enumerate() {
            next[k + 1] += c;
            next[k] -= point * c;
        }
        vanishing = next;
    }

    // barycentric denominators prod_{j != i} (i - j)
    let mut denominators: Vec<Fr> = (0..n)
        .map(|i| {
            let xi = Fr::from(i as u64);
            (0..n)
                .filter(|j| *j != i)
                .fold(Fr::one(), |acc, j| acc * (xi - Fr::from(j as u64)))
        })
        .collect();
    batch_inversion(&mut denominators);

    let mut coeffs = vec![Fr::zero(); n];
    for (i, value) in values.iter().enumerate() {
        if value.is_zero() {
            continue;
        }
        let basis = divide_by_linear(&vanishing, Fr::from(i as u64));
        let scale = *value * denominators[i];
        for (c, b) in coeffs.iter_mut().zip(basis.iter()) {
            *c += scale * b;
        }
    }

    Polynomial::from_coefficients_vec(coeffs)
}

/// quotient (p(X) - p(x)) / (X - x), together with p(x)
pub fn quotient(poly: &Polynomial, x: Fr) -> (Fr, Polynomial) {
    let y = poly.evaluate(&x);

    let mut shifted = poly.coeffs.clone();
    if shifted.is_empty() {
        shifted.push(-y);
    } else {
        shifted[0] -= y;
    }
    let numerator = Polynomial::from_coefficients_vec(shifted);
    if numerator.is_zero() {
        return (y, numerator);
    }

    let divisor = Polynomial::from_coefficients_vec(vec![-x, Fr::one()]);
    let q = DenseOrSparsePolynomial::from(&numerator)
        .divide_with_q_and_r(&DenseOrSparsePolynomial::from(&divisor))
        .map(|(q, _)| q)
        .unwrap_or_else(|| Polynomial::from_coefficients_vec(vec![]));

    (y, q)
}

/// synthetic division by (X - root), remainder discarded
/// (exact for roots of the vanishing polynomial)
fn divide_by_linear(coeffs: &[Fr], root: Fr) -> Vec<Fr> {
    let degree = coeffs.len() - 1;
    let mut out = vec![Fr::zero(); degree];
    let mut carry = Fr::zero();
    for k in (1..=degree).rev() {
        carry = coeffs[k] + root * carry;
        out[k - 1] = carry;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_poly::Polynomial as _;
    use ark_std::UniformRand;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn evaluate_at(poly: &Polynomial, point: u64) -> Fr {
        poly.evaluate(&Fr::from(point))
    }

    #[test]
    fn test_interpolate_hits_every_point() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let values: Vec<Fr> = (0..8).map(|_| Fr::rand(&mut rng)).collect();
        let poly = interpolate(&values);

        assert!(poly.degree() <= 7);
        for (i, v) in values.iter().enumerate() {
            assert_eq!(evaluate_at(&poly, i as u64), *v);
        }
    }

    #[test]
    fn test_interpolate_constant_window() {
        let c = Fr::from(42u64);
        let poly = interpolate(&[c; 4]);
        assert_eq!(poly.coeffs, vec![c]);
    }

    #[test]
    fn test_interpolate_zero_window_is_zero_polynomial() {
        let poly = interpolate(&[Fr::zero(); 4]);
        assert!(poly.is_zero());
    }

    #[test]
    fn test_quotient_identity() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let values: Vec<Fr> = (0..5).map(|_| Fr::rand(&mut rng)).collect();
        let poly = interpolate(&values);
        let x = Fr::from(3u64);

        let (y, q) = quotient(&poly, x);
        assert_eq!(y, values[3]);

        // q(z) * (z - x) == p(z) - y at a random point
        let z = Fr::rand(&mut rng);
        assert_eq!(q.evaluate(&z) * (z - x), poly.evaluate(&z) - y);
    }

    #[test]
    fn test_quotient_of_constant_is_zero() {
        let poly = Polynomial::from_coefficients_vec(vec![Fr::from(9u64)]);
        let (y, q) = quotient(&poly, Fr::from(2u64));
        assert_eq!(y, Fr::from(9u64));
        assert!(q.is_zero());
    }
}
