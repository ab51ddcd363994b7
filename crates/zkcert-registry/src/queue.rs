//! ledger queue processor
//!
//! Drains the registry's FIFO one entry at a time: builds the merkle path
//! the entry needs from the local mirror, submits `processNextOperation`,
//! then mirrors the accepted change. Failures never stop the loop; they are
//! logged and retried after a backoff.

use crate::error::{RegistryError, Result};
use crate::ledger::Registry;
use crate::sync::{require_success, RegistrySynchronizer};
use crate::types::{CallKind, Operation, QueueOperation, RegistryCall};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use zkcert_field::{fr_to_decimal, Fr};
use zkcert_tree::{empty_leaf, CommitmentTree};

/// cooperative stop signal, checked once per loop iteration
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// outcome of one processing step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// queue empty, or the entry at the pointer needs no work
    Idle,
    Applied {
        leaf: Fr,
        index: u64,
        operation: Operation,
    },
}

pub struct QueueProcessor<R> {
    sync: RegistrySynchronizer<R>,
    shutdown: ShutdownHandle,
}

impl<R: Registry> QueueProcessor<R> {
    /// `sync` should already be synced; its tree becomes the processor's mirror
    pub fn new(sync: RegistrySynchronizer<R>) -> Self {
        Self {
            sync,
            shutdown: ShutdownHandle::new(),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn synchronizer(&self) -> &RegistrySynchronizer<R> {
        &self.sync
    }

    pub fn into_synchronizer(self) -> RegistrySynchronizer<R> {
        self.sync
    }

    /// Process the entry at the queue pointer, if any.
    pub async fn process_next(&mut self) -> Result<Step> {
        let registry = self.sync.registry();
        let pointer = registry.queue_pointer().await?;
        let length = registry.queue_length().await?;
        if pointer >= length {
            return Ok(Step::Idle);
        }

        let leaf = registry.queue_entry(pointer).await?;
        let info = registry.processing_info(leaf).await?;
        let tree = self.sync.tree();
        let (index, operation, replacement) = match info.state {
            QueueOperation::IssuanceQueued => (tree.free_leaf_index()?, Operation::Add, leaf),
            QueueOperation::RevocationQueued => {
                let index = tree
                    .leaf_index(&leaf)
                    .ok_or_else(|| RegistryError::UnknownLeaf {
                        leaf: fr_to_decimal(&leaf),
                    })?;
                (index, Operation::Revoke, empty_leaf())
            }
            QueueOperation::Processed => {
                debug!("queue entry {} already processed", pointer);
                return Ok(Step::Idle);
            }
        };
        let proof = tree.create_proof(index)?;

        let receipt = registry
            .submit(RegistryCall {
                kind: CallKind::ProcessQueue,
                leaf_index: index,
                leaf_hash: leaf,
                merkle_proof: proof.path_elements,
            })
            .await?;
        require_success(&receipt)?;

        self.sync.tree_mut().insert_leaves(&[replacement], &[index])?;
        info!(
            "processed queue entry {}: {:?} leaf {} at index {}",
            pointer,
            operation,
            fr_to_decimal(&leaf),
            index
        );
        Ok(Step::Applied {
            leaf,
            index,
            operation,
        })
    }

    /// Process entries until shutdown is requested.
    pub async fn run(&mut self) {
        info!("starting queue processor");
        let idle = self.sync.config().processor_idle_interval;
        let backoff = self.sync.config().processor_backoff;

        loop {
            if self.shutdown.is_requested() {
                info!("queue processor stopping");
                return;
            }

            match self.process_next().await {
                Ok(Step::Applied { .. }) => {}
                Ok(Step::Idle) => tokio::time::sleep(idle).await,
                Err(e) => {
                    warn!("queue processing failed, retrying in {:?}: {}", backoff, e);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}
