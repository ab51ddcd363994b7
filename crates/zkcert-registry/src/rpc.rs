//! EVM JSON-RPC registry client
//!
//! Talks to a node over plain JSON-RPC. State-changing calls go through
//! `eth_sendTransaction`, so the node must manage and unlock the sender
//! account. Receipts are polled until mined with no upper bound.

use crate::abi::{
    self, currentQueuePointerCall, getTimeParametersCall, getZkCertificateQueueLengthCall,
    registerToQueueCall, treeDepthCall, zkCertificateProcessingInfoCall, zkCertificateQueueCall,
    ZkCertificateProcessed,
};
use crate::error::{RegistryError, Result};
use crate::ledger::Registry;
use crate::types::{
    Address, LeafEvent, Operation, ProcessingInfo, QueueOperation, RegistryCall, TxHash, TxReceipt,
};
use alloy_primitives::{Bytes, B256, U64};
use alloy_sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use zkcert_field::Fr;

#[derive(Clone)]
pub struct JsonRpcRegistry {
    url: String,
    client: Client,
    address: Address,
    sender: Address,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    topics: Vec<B256>,
    data: Bytes,
    block_number: Option<U64>,
    log_index: Option<U64>,
    #[serde(default)]
    removed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    status: Option<U64>,
    block_number: Option<U64>,
}

impl JsonRpcRegistry {
    pub fn new(url: &str, address: Address, sender: Address) -> Self {
        Self {
            url: url.to_string(),
            client: Client::new(),
            address,
            sender,
            poll_interval: crate::config::CONFIRMATION_POLL_INTERVAL,
        }
    }

    /// receipt polling interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RegistryError::Rpc(e.to_string()))?;

        let json: RpcResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::Rpc(e.to_string()))?;

        if let Some(error) = json.error {
            return Err(RegistryError::Rpc(format!(
                "{} failed with {}: {}",
                method, error.code, error.message
            )));
        }

        // null is a valid result (pending receipts)
        Ok(json.result.unwrap_or(Value::Null))
    }

    async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        let result = self.call(method, params).await?;
        serde_json::from_value(result)
            .map_err(|e| RegistryError::Rpc(format!("{} returned unexpected result: {}", method, e)))
    }

    async fn quantity(&self, method: &str) -> Result<u64> {
        let value: U64 = self.call_as(method, vec![]).await?;
        Ok(value.to::<u64>())
    }

    /// read-only contract call
    async fn view<C: SolCall + Send>(&self, call: C) -> Result<C::Return> {
        let data: Bytes = self
            .call_as(
                "eth_call",
                vec![
                    json!({"to": self.address.to_string(), "data": Bytes::from(call.abi_encode())}),
                    json!("latest"),
                ],
            )
            .await?;
        Ok(C::abi_decode_returns(&data[..], true)?)
    }

    /// send a transaction from the node-managed sender and wait for its receipt
    async fn transact(&self, signature: &str, data: Vec<u8>) -> Result<TxReceipt> {
        let hash: B256 = self
            .call_as(
                "eth_sendTransaction",
                vec![json!({
                    "from": self.sender.to_string(),
                    "to": self.address.to_string(),
                    "data": Bytes::from(data),
                })],
            )
            .await?;
        debug!("sent {} as {}", signature, hash);
        self.wait_for_receipt(hash).await
    }

    async fn wait_for_receipt(&self, hash: B256) -> Result<TxReceipt> {
        loop {
            let receipt: Option<RpcReceipt> = self
                .call_as("eth_getTransactionReceipt", vec![json!(hash)])
                .await?;
            if let Some(RpcReceipt {
                transaction_hash,
                status,
                block_number: Some(block),
            }) = receipt
            {
                return Ok(TxReceipt {
                    hash: TxHash(transaction_hash.0),
                    status: status == Some(U64::from(1)),
                    block_number: block.to::<u64>(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn decode_log(log: &RpcLog) -> Result<LeafEvent> {
    let event =
        ZkCertificateProcessed::decode_raw_log(log.topics.iter().copied(), &log.data[..], true)?;

    let pending = || RegistryError::Abi("log without block position".into());
    Ok(LeafEvent {
        leaf_hash: abi::word_fr(&event.zkCertificateLeafHash)?,
        guardian: abi::from_alloy_address(event.guardian),
        operation: Operation::from_u8(event.operation)?,
        queue_index: abi::to_u64(event.queueIndex, "queue index")?,
        index: abi::to_u64(event.leafIndex, "leaf index")?,
        block_number: log.block_number.ok_or_else(pending)?.to::<u64>(),
        log_index: log.log_index.ok_or_else(pending)?.to::<u64>(),
    })
}

#[async_trait]
impl Registry for JsonRpcRegistry {
    async fn chain_id(&self) -> Result<u64> {
        self.quantity("eth_chainId").await
    }

    fn address(&self) -> Address {
        self.address
    }

    fn sender(&self) -> Address {
        self.sender
    }

    async fn block_number(&self) -> Result<u64> {
        self.quantity("eth_blockNumber").await
    }

    async fn tree_depth(&self) -> Result<usize> {
        let depth = abi::to_u64(self.view(treeDepthCall {}).await?.depth, "tree depth")?;
        usize::try_from(depth).map_err(|_| RegistryError::Abi(format!("tree depth {}", depth)))
    }

    async fn leaf_events(&self, from: u64, to: u64) -> Result<Vec<LeafEvent>> {
        let filter = json!({
            "address": self.address.to_string(),
            "fromBlock": U64::from(from),
            "toBlock": U64::from(to),
            "topics": [ZkCertificateProcessed::SIGNATURE_HASH],
        });
        let logs: Vec<RpcLog> = self.call_as("eth_getLogs", vec![filter]).await?;
        logs.iter()
            .filter(|log| !log.removed)
            .map(decode_log)
            .collect()
    }

    async fn submit(&self, call: RegistryCall) -> Result<TxReceipt> {
        let (signature, data) = abi::encode_path_call(&call);
        self.transact(signature, data).await
    }

    async fn register_to_queue(&self, leaf: Fr, operation: Operation) -> Result<TxReceipt> {
        let call = registerToQueueCall {
            zkCertificateHash: abi::fr_word(&leaf),
            operation: operation.as_u8(),
        };
        self.transact(registerToQueueCall::SIGNATURE, call.abi_encode())
            .await
    }

    async fn queue_pointer(&self) -> Result<u64> {
        let pointer = self.view(currentQueuePointerCall {}).await?.pointer;
        abi::to_u64(pointer, "queue pointer")
    }

    async fn queue_length(&self) -> Result<u64> {
        let length = self.view(getZkCertificateQueueLengthCall {}).await?.length;
        abi::to_u64(length, "queue length")
    }

    async fn queue_entry(&self, index: u64) -> Result<Fr> {
        let entry = self
            .view(zkCertificateQueueCall {
                index: alloy_primitives::U256::from(index),
            })
            .await?;
        abi::word_fr(&entry.zkCertificateHash)
    }

    async fn processing_info(&self, leaf: Fr) -> Result<ProcessingInfo> {
        let info = self
            .view(zkCertificateProcessingInfoCall {
                zkCertificateHash: abi::fr_word(&leaf),
            })
            .await?;
        Ok(ProcessingInfo {
            guardian: abi::from_alloy_address(info.guardian),
            state: QueueOperation::from_u8(info.state)?,
            queue_index: abi::to_u64(info.queueIndex, "queue index")?,
        })
    }

    async fn time_window(&self, leaf: Fr) -> Result<(u64, u64)> {
        let window = self
            .view(getTimeParametersCall {
                zkCertificateHash: abi::fr_word(&leaf),
            })
            .await?;
        Ok((
            abi::to_u64(window.start, "window start")?,
            abi::to_u64(window.expiration, "window expiration")?,
        ))
    }
}
