//! ledger seam: everything the sync engine needs from the registry contract

use crate::error::Result;
use crate::types::{Address, LeafEvent, Operation, ProcessingInfo, RegistryCall, TxReceipt};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use zkcert_field::Fr;

/// wall clock in unix seconds, the time base of queue windows
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[async_trait]
pub trait Registry: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;

    /// registry contract address
    fn address(&self) -> Address;

    /// account state-changing calls are sent from
    fn sender(&self) -> Address;

    async fn block_number(&self) -> Result<u64>;

    async fn tree_depth(&self) -> Result<usize>;

    /// `ZkCertificateProcessed` logs in blocks `from..=to`, in ledger order
    async fn leaf_events(&self, from: u64, to: u64) -> Result<Vec<LeafEvent>>;

    /// send a call and wait until it is mined
    async fn submit(&self, call: RegistryCall) -> Result<TxReceipt>;

    async fn register_to_queue(&self, leaf: Fr, operation: Operation) -> Result<TxReceipt>;

    async fn queue_pointer(&self) -> Result<u64>;

    async fn queue_length(&self) -> Result<u64>;

    async fn queue_entry(&self, index: u64) -> Result<Fr>;

    async fn processing_info(&self, leaf: Fr) -> Result<ProcessingInfo>;

    /// (start, expiration) in unix seconds for a queued leaf
    async fn time_window(&self, leaf: Fr) -> Result<(u64, u64)>;
}

#[async_trait]
impl<R: Registry + ?Sized> Registry for Arc<R> {
    async fn chain_id(&self) -> Result<u64> {
        (**self).chain_id().await
    }

    fn address(&self) -> Address {
        (**self).address()
    }

    fn sender(&self) -> Address {
        (**self).sender()
    }

    async fn block_number(&self) -> Result<u64> {
        (**self).block_number().await
    }

    async fn tree_depth(&self) -> Result<usize> {
        (**self).tree_depth().await
    }

    async fn leaf_events(&self, from: u64, to: u64) -> Result<Vec<LeafEvent>> {
        (**self).leaf_events(from, to).await
    }

    async fn submit(&self, call: RegistryCall) -> Result<TxReceipt> {
        (**self).submit(call).await
    }

    async fn register_to_queue(&self, leaf: Fr, operation: Operation) -> Result<TxReceipt> {
        (**self).register_to_queue(leaf, operation).await
    }

    async fn queue_pointer(&self) -> Result<u64> {
        (**self).queue_pointer().await
    }

    async fn queue_length(&self) -> Result<u64> {
        (**self).queue_length().await
    }

    async fn queue_entry(&self, index: u64) -> Result<Fr> {
        (**self).queue_entry(index).await
    }

    async fn processing_info(&self, leaf: Fr) -> Result<ProcessingInfo> {
        (**self).processing_info(leaf).await
    }

    async fn time_window(&self, leaf: Fr) -> Result<(u64, u64)> {
        (**self).time_window(leaf).await
    }
}
