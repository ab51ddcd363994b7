//! registry contract interface
//!
//! Call data and event layouts come from the `sol!` declaration; the helpers
//! here only move values between alloy word types and the crate's own types.

use crate::error::{RegistryError, Result};
use crate::types::{Address, CallKind, RegistryCall};
use alloy_primitives::{B256, U256};
use alloy_sol_types::{sol, SolCall};
use zkcert_field::{fr_from_bytes32, fr_to_bytes32, Fr};

sol! {
    interface IZkCertificateRegistry {
        event ZkCertificateProcessed(
            bytes32 indexed zkCertificateLeafHash,
            address indexed guardian,
            uint8 operation,
            uint256 queueIndex,
            uint256 leafIndex
        );

        function addZkCertificate(uint256 leafIndex, bytes32 zkCertificateHash, bytes32[] merkleProof) external;
        function revokeZkCertificate(uint256 leafIndex, bytes32 zkCertificateHash, bytes32[] merkleProof) external;
        function processNextOperation(uint256 leafIndex, bytes32 zkCertificateHash, bytes32[] merkleProof) external;
        function registerToQueue(bytes32 zkCertificateHash, uint8 operation) external;

        function treeDepth() external view returns (uint256 depth);
        function currentQueuePointer() external view returns (uint256 pointer);
        function getZkCertificateQueueLength() external view returns (uint256 length);
        function zkCertificateQueue(uint256 index) external view returns (bytes32 zkCertificateHash);
        function zkCertificateProcessingInfo(bytes32 zkCertificateHash)
            external view returns (address guardian, uint8 state, uint256 queueIndex);
        function getTimeParameters(bytes32 zkCertificateHash)
            external view returns (uint256 start, uint256 expiration);
    }
}

pub use IZkCertificateRegistry::*;

pub fn fr_word(value: &Fr) -> B256 {
    B256::from(fr_to_bytes32(value))
}

pub fn word_fr(word: &B256) -> Result<Fr> {
    Ok(fr_from_bytes32(word.as_slice())?)
}

pub fn to_u64(value: U256, what: &str) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| RegistryError::Abi(format!("{} {} does not fit in u64", what, value)))
}

pub fn from_alloy_address(address: alloy_primitives::Address) -> Address {
    Address(address.0 .0)
}

pub fn to_alloy_address(address: &Address) -> alloy_primitives::Address {
    alloy_primitives::Address::from(address.0)
}

/// signature and call data of a path-carrying registry call
pub fn encode_path_call(call: &RegistryCall) -> (&'static str, Vec<u8>) {
    let leaf_index = U256::from(call.leaf_index);
    let leaf_hash = fr_word(&call.leaf_hash);
    let path: Vec<B256> = call.merkle_proof.iter().map(fr_word).collect();

    match call.kind {
        CallKind::Add => (
            addZkCertificateCall::SIGNATURE,
            addZkCertificateCall {
                leafIndex: leaf_index,
                zkCertificateHash: leaf_hash,
                merkleProof: path,
            }
            .abi_encode(),
        ),
        CallKind::Revoke => (
            revokeZkCertificateCall::SIGNATURE,
            revokeZkCertificateCall {
                leafIndex: leaf_index,
                zkCertificateHash: leaf_hash,
                merkleProof: path,
            }
            .abi_encode(),
        ),
        CallKind::ProcessQueue => (
            processNextOperationCall::SIGNATURE,
            processNextOperationCall {
                leafIndex: leaf_index,
                zkCertificateHash: leaf_hash,
                merkleProof: path,
            }
            .abi_encode(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::SolEvent;

    #[test]
    fn test_event_signature() {
        assert_eq!(
            ZkCertificateProcessed::SIGNATURE,
            "ZkCertificateProcessed(bytes32,address,uint8,uint256,uint256)"
        );
        assert_eq!(
            ZkCertificateProcessed::SIGNATURE_HASH,
            alloy_primitives::keccak256(ZkCertificateProcessed::SIGNATURE)
        );
    }

    #[test]
    fn test_path_call_layout() {
        let call = RegistryCall {
            kind: CallKind::Revoke,
            leaf_index: 5,
            leaf_hash: Fr::from(8u64),
            merkle_proof: vec![Fr::from(1u64), Fr::from(2u64)],
        };
        let (signature, data) = encode_path_call(&call);
        assert_eq!(signature, "revokeZkCertificate(uint256,bytes32,bytes32[])");
        assert_eq!(data[..4], revokeZkCertificateCall::SELECTOR);
        // selector + 3 head words + length + 2 items
        assert_eq!(data.len(), 4 + 6 * 32);

        let decoded = revokeZkCertificateCall::abi_decode(&data, true).unwrap();
        assert_eq!(decoded.leafIndex, U256::from(5u64));
        assert_eq!(word_fr(&decoded.zkCertificateHash).unwrap(), Fr::from(8u64));
        assert_eq!(decoded.merkleProof, vec![fr_word(&Fr::from(1u64)), fr_word(&Fr::from(2u64))]);
    }

    #[test]
    fn test_wide_values_are_rejected() {
        assert_eq!(to_u64(U256::from(7u64), "depth").unwrap(), 7);
        assert!(to_u64(U256::MAX, "depth").is_err());
        // bytes32 above the field modulus
        assert!(word_fr(&B256::repeat_byte(0xff)).is_err());
    }

    #[test]
    fn test_address_conversion() {
        let address: Address = "0x00000000000000000000000000000000000000bb".parse().unwrap();
        assert_eq!(from_alloy_address(to_alloy_address(&address)), address);
    }
}
