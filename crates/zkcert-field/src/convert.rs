//! conversions between field elements and their external encodings
//!
//! circuits and the cache file carry field elements as decimal strings,
//! the ledger carries them as big-endian bytes32 words.

use crate::{FieldError, Fr, Result};
use ark_ff::{BigInteger, PrimeField};
use num_bigint::BigUint;
use std::str::FromStr;

/// field modulus as a big integer
pub fn modulus() -> BigUint {
    BigUint::from_bytes_le(&Fr::MODULUS.to_bytes_le())
}

/// parse a decimal string, rejecting values >= p
pub fn fr_from_decimal(s: &str) -> Result<Fr> {
    let value = BigUint::from_str(s.trim())
        .map_err(|_| FieldError::InvalidDecimal(s.to_string()))?;
    if value >= modulus() {
        return Err(FieldError::NotReduced(s.to_string()));
    }
    Ok(Fr::from_le_bytes_mod_order(&value.to_bytes_le()))
}

/// canonical decimal representation ("0" for zero)
pub fn fr_to_decimal(value: &Fr) -> String {
    BigUint::from_bytes_le(&value.into_bigint().to_bytes_le()).to_string()
}

/// big-endian 32 byte word, as passed to the registry contract
pub fn fr_to_bytes32(value: &Fr) -> [u8; 32] {
    let bytes = value.into_bigint().to_bytes_be();
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    out
}

/// parse a big-endian 32 byte word, rejecting values >= p
pub fn fr_from_bytes32(bytes: &[u8]) -> Result<Fr> {
    if bytes.len() != 32 {
        return Err(FieldError::InvalidLength {
            expected: 32,
            got: bytes.len(),
        });
    }
    let value = BigUint::from_bytes_be(bytes);
    if value >= modulus() {
        return Err(FieldError::NotReduced(format!("0x{}", hex::encode(bytes))));
    }
    Ok(Fr::from_be_bytes_mod_order(bytes))
}

/// serde adapter: field element as a decimal string
pub mod serde_decimal {
    use super::*;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Fr, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&fr_to_decimal(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Fr, D::Error> {
        let s = String::deserialize(deserializer)?;
        fr_from_decimal(&s).map_err(D::Error::custom)
    }
}

/// serde adapter: list of field elements as decimal strings
pub mod serde_decimal_vec {
    use super::*;
    use serde::{de::Error, ser::SerializeSeq, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[Fr], serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&fr_to_decimal(value))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<Fr>, D::Error> {
        let strings = Vec::<String>::deserialize(deserializer)?;
        strings
            .iter()
            .map(|s| fr_from_decimal(s).map_err(D::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_zero_and_small() {
        assert_eq!(fr_to_decimal(&Fr::from(0u64)), "0");
        assert_eq!(fr_to_decimal(&Fr::from(1234u64)), "1234");
        assert_eq!(fr_from_decimal("1234").unwrap(), Fr::from(1234u64));
    }

    #[test]
    fn test_decimal_rejects_unreduced() {
        let p = modulus().to_string();
        assert!(matches!(fr_from_decimal(&p), Err(FieldError::NotReduced(_))));
        assert!(matches!(fr_from_decimal("12a"), Err(FieldError::InvalidDecimal(_))));
    }

    #[test]
    fn test_bytes32_is_big_endian() {
        let bytes = fr_to_bytes32(&Fr::from(258u64));
        assert_eq!(bytes[31], 2);
        assert_eq!(bytes[30], 1);
        assert!(bytes[..30].iter().all(|b| *b == 0));
        assert_eq!(fr_from_bytes32(&bytes).unwrap(), Fr::from(258u64));
    }

    #[test]
    fn test_bytes32_rejects_bad_input() {
        assert!(matches!(
            fr_from_bytes32(&[0u8; 31]),
            Err(FieldError::InvalidLength { expected: 32, got: 31 })
        ));
        assert!(matches!(fr_from_bytes32(&[0xff; 32]), Err(FieldError::NotReduced(_))));
    }
}
