//! values exchanged with the ledger registry

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use zkcert_field::convert::serde_decimal;
use zkcert_field::Fr;

/// 20-byte account or contract address, rendered as lowercase 0x-hex
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|e| RegistryError::Abi(format!("address {}: {}", s, e)))?;
        let array: [u8; 20] = bytes
            .try_into()
            .map_err(|_| RegistryError::Abi(format!("address {} is not 20 bytes", s)))?;
        Ok(Address(array))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// transaction hash
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TxHash(pub [u8; 32]);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self)
    }
}

/// discriminant of a `ZkCertificateProcessed` event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Add,
    Revoke,
}

impl Operation {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Operation::Add),
            1 => Ok(Operation::Revoke),
            other => Err(RegistryError::Abi(format!("unknown operation {}", other))),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Operation::Add => 0,
            Operation::Revoke => 1,
        }
    }
}

/// processing state of a leaf in the ledger queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueOperation {
    /// terminal; also what the ledger reports for leaves it never saw
    Processed,
    IssuanceQueued,
    RevocationQueued,
}

impl QueueOperation {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(QueueOperation::Processed),
            1 => Ok(QueueOperation::IssuanceQueued),
            2 => Ok(QueueOperation::RevocationQueued),
            other => Err(RegistryError::Abi(format!("unknown queue state {}", other))),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            QueueOperation::Processed => 0,
            QueueOperation::IssuanceQueued => 1,
            QueueOperation::RevocationQueued => 2,
        }
    }
}

/// one decoded `ZkCertificateProcessed` log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafEvent {
    pub leaf_hash: Fr,
    pub guardian: Address,
    pub operation: Operation,
    pub queue_index: u64,
    pub index: u64,
    pub block_number: u64,
    pub log_index: u64,
}

/// reconciled (value, index) pair, as stored in the leaf-log cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafEntry {
    #[serde(with = "serde_decimal")]
    pub leaf_hash: Fr,
    #[serde(with = "index_string")]
    pub index: u64,
}

/// leaf indices are stored as decimal strings like the leaf hashes
mod index_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(index: &u64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&index.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl LeafEntry {
    pub fn new(leaf_hash: Fr, index: u64) -> Self {
        Self { leaf_hash, index }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingInfo {
    pub guardian: Address,
    pub state: QueueOperation,
    pub queue_index: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub hash: TxHash,
    /// false when the transaction was mined but reverted
    pub status: bool,
    pub block_number: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Add,
    Revoke,
    ProcessQueue,
}

/// a state-changing registry call carrying a merkle path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCall {
    pub kind: CallKind,
    pub leaf_index: u64,
    pub leaf_hash: Fr,
    /// siblings from leaf level upwards
    pub merkle_proof: Vec<Fr>,
}

/// where an issued certificate lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkCertRegistration {
    pub registry_address: Address,
    pub chain_id: u64,
    pub leaf_index: u64,
}
