//! registry synchronizer
//!
//! Owns the off-chain mirror of the registry tree. `sync` rebuilds it from
//! reconciled ledger history; issue/revoke submit a path-carrying call and,
//! once the ledger accepted it, apply the same change locally so the mirror
//! keeps tracking the ledger root.

use crate::config::SyncConfig;
use crate::error::{RegistryError, Result};
use crate::ledger::{unix_now, Registry};
use crate::reconcile::reconcile_leaves;
use crate::types::{CallKind, Operation, RegistryCall, TxReceipt, ZkCertRegistration};
use tracing::{debug, info};
use zkcert_field::{fr_to_decimal, Fr};
use zkcert_tree::{empty_leaf, CommitmentTree, MerkleProof, PoseidonHash, SparseMerkleTree};

pub type RegistryTree = SparseMerkleTree<PoseidonHash>;

pub struct RegistrySynchronizer<R> {
    registry: R,
    config: SyncConfig,
    chain_id: u64,
    tree: RegistryTree,
}

impl<R: Registry> RegistrySynchronizer<R> {
    /// empty mirror sized to the ledger's tree depth; call [`Self::sync`] to fill it
    pub async fn new(registry: R, config: SyncConfig) -> Result<Self> {
        let chain_id = registry.chain_id().await?;
        let depth = registry.tree_depth().await?;
        let tree = SparseMerkleTree::new(depth, PoseidonHash::new()?)?;
        info!(
            "registry {} on chain {}: tree depth {}",
            registry.address(),
            chain_id,
            depth
        );
        Ok(Self {
            registry,
            config,
            chain_id,
            tree,
        })
    }

    /// Rebuild the tree from ledger history, returning the active leaf count.
    pub async fn sync<F: FnMut(&str)>(&mut self, on_progress: F) -> Result<usize> {
        let leaves = reconcile_leaves(&self.registry, &self.config, on_progress).await?;

        let mut tree = SparseMerkleTree::new(self.tree.depth(), PoseidonHash::new()?)?;
        let batch_size = self.config.tree_batch_size.max(1);
        for (batch, chunk) in leaves.chunks(batch_size).enumerate() {
            let values: Vec<Fr> = chunk.iter().map(|e| e.leaf_hash).collect();
            let indices: Vec<u64> = chunk.iter().map(|e| e.index).collect();
            tree.insert_leaves(&values, &indices)?;
            debug!("inserted batch {} ({} leaves)", batch, chunk.len());
            tokio::task::yield_now().await;
        }

        self.tree = tree;
        info!(
            "tree rebuilt with {} leaves, root {}",
            leaves.len(),
            fr_to_decimal(&self.tree.root())
        );
        Ok(leaves.len())
    }

    /// Add `leaf` at the next free index.
    ///
    /// Returns the proof against the new root and where the leaf was placed.
    pub async fn issue(&mut self, leaf: Fr) -> Result<(MerkleProof, ZkCertRegistration)> {
        let index = self.tree.free_leaf_index()?;
        let empty_proof = self.tree.create_proof(index)?;

        let receipt = self
            .registry
            .submit(RegistryCall {
                kind: CallKind::Add,
                leaf_index: index,
                leaf_hash: leaf,
                merkle_proof: empty_proof.path_elements,
            })
            .await?;
        require_success(&receipt)?;

        self.tree.insert_leaves(&[leaf], &[index])?;
        info!(
            "issued leaf {} at index {} in block {}",
            fr_to_decimal(&leaf),
            index,
            receipt.block_number
        );
        Ok((self.tree.create_proof(index)?, self.registration(index)))
    }

    /// Revoke `leaf` stored at `index`; returns the proof of the now empty slot.
    pub async fn revoke(&mut self, leaf: Fr, index: u64) -> Result<MerkleProof> {
        let found = self.tree.retrieve_leaf(0, index)?;
        if found != leaf {
            return Err(RegistryError::LeafMismatch {
                index,
                expected: fr_to_decimal(&leaf),
                found: fr_to_decimal(&found),
            });
        }

        let info = self.registry.processing_info(leaf).await?;
        let caller = self.registry.sender();
        if info.guardian != caller {
            return Err(RegistryError::Unauthorized {
                leaf: fr_to_decimal(&leaf),
                caller: caller.to_string(),
                guardian: info.guardian.to_string(),
            });
        }

        let proof = self.tree.create_proof(index)?;
        let receipt = self
            .registry
            .submit(RegistryCall {
                kind: CallKind::Revoke,
                leaf_index: index,
                leaf_hash: leaf,
                merkle_proof: proof.path_elements,
            })
            .await?;
        require_success(&receipt)?;

        self.tree.insert_leaves(&[empty_leaf()], &[index])?;
        info!(
            "revoked leaf {} at index {} in block {}",
            fr_to_decimal(&leaf),
            index,
            receipt.block_number
        );
        Ok(self.tree.create_proof(index)?)
    }

    /// [`Self::issue`] through the ledger queue: register, wait for the
    /// queue slot, then add.
    pub async fn issue_queued(&mut self, leaf: Fr) -> Result<(MerkleProof, ZkCertRegistration)> {
        self.enqueue(leaf, Operation::Add).await?;
        self.wait_for_queue_turn(leaf).await?;
        self.issue(leaf).await
    }

    /// [`Self::revoke`] through the ledger queue.
    pub async fn revoke_queued(&mut self, leaf: Fr, index: u64) -> Result<MerkleProof> {
        let found = self.tree.retrieve_leaf(0, index)?;
        if found != leaf {
            return Err(RegistryError::LeafMismatch {
                index,
                expected: fr_to_decimal(&leaf),
                found: fr_to_decimal(&found),
            });
        }
        self.enqueue(leaf, Operation::Revoke).await?;
        self.wait_for_queue_turn(leaf).await?;
        self.revoke(leaf, index).await
    }

    async fn enqueue(&self, leaf: Fr, operation: Operation) -> Result<()> {
        let receipt = self.registry.register_to_queue(leaf, operation).await?;
        require_success(&receipt)?;
        debug!("queued {:?} for leaf {}", operation, fr_to_decimal(&leaf));
        Ok(())
    }

    /// poll until the queue pointer sits on `leaf` inside its time window
    async fn wait_for_queue_turn(&self, leaf: Fr) -> Result<()> {
        let queue_index = self.registry.processing_info(leaf).await?.queue_index;
        let (start, expiration) = self.registry.time_window(leaf).await?;
        info!(
            "waiting for queue slot {} (window {} -> {})",
            queue_index, start, expiration
        );

        loop {
            let pointer = self.registry.queue_pointer().await?;
            let now = unix_now();
            if pointer > queue_index || now > expiration {
                return Err(RegistryError::QueueExpired {
                    leaf: fr_to_decimal(&leaf),
                    queue_index,
                });
            }
            if pointer == queue_index && now >= start {
                return Ok(());
            }
            debug!("queue pointer at {}, waiting for {}", pointer, queue_index);
            tokio::time::sleep(self.config.queue_poll_interval).await;
        }
    }

    pub fn tree(&self) -> &RegistryTree {
        &self.tree
    }

    pub(crate) fn tree_mut(&mut self) -> &mut RegistryTree {
        &mut self.tree
    }

    pub fn root(&self) -> Fr {
        self.tree.root()
    }

    pub fn proof(&self, index: u64) -> Result<MerkleProof> {
        Ok(self.tree.create_proof(index)?)
    }

    pub fn registration(&self, index: u64) -> ZkCertRegistration {
        ZkCertRegistration {
            registry_address: self.registry.address(),
            chain_id: self.chain_id,
            leaf_index: index,
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

pub(crate) fn require_success(receipt: &TxReceipt) -> Result<()> {
    if !receipt.status {
        return Err(RegistryError::TransactionReverted {
            tx: receipt.hash.to_string(),
        });
    }
    Ok(())
}
