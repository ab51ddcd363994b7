//! in-memory registry ledger
//!
//! Behaves like the registry contract: it only stores the root and checks
//! every submitted merkle path against it before applying the update, emits
//! `ZkCertificateProcessed` events, and runs the FIFO queue. Failed checks
//! mine a reverted transaction rather than returning an error.
//!
//! Failure injection hooks let tests exercise retry and recovery paths:
//! failing log queries, forced reverts, duplicate log delivery.

use crate::error::{RegistryError, Result};
use crate::ledger::{unix_now, Registry};
use crate::types::{
    Address, CallKind, LeafEvent, Operation, ProcessingInfo, QueueOperation, RegistryCall, TxHash,
    TxReceipt,
};
use alloy_primitives::keccak256;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use zkcert_field::Fr;
use zkcert_tree::{compute_root, empty_leaf, CommitmentTree, PoseidonHash, SparseMerkleTree};

pub const DEFAULT_CHAIN_ID: u64 = 31337;
pub const DEFAULT_REGISTRY: Address = Address([
    0x5f, 0xbd, 0xb2, 0x31, 0x56, 0x78, 0xaf, 0xec, 0xb3, 0x67, 0xf0, 0x32, 0xd9, 0x3f, 0x64, 0x2f,
    0x64, 0x18, 0x0a, 0xa3,
]);
pub const DEFAULT_GUARDIAN: Address = Address([
    0xf3, 0x9f, 0xd6, 0xe5, 0x1a, 0xad, 0x88, 0xf6, 0xf4, 0xce, 0x6a, 0xb8, 0x82, 0x72, 0x79, 0xcf,
    0xff, 0xb9, 0x22, 0x66,
]);
pub const DEFAULT_QUEUE_EXPIRATION: Duration = Duration::from_secs(3600);

enum QueueTurn {
    NotQueued,
    Ready(u64),
    Blocked,
}

struct LedgerState {
    depth: usize,
    hasher: PoseidonHash,
    root: Fr,
    block_number: u64,
    tx_count: u64,
    events: Vec<LeafEvent>,
    guardians: HashSet<Address>,
    processing: HashMap<Fr, ProcessingInfo>,
    windows: HashMap<Fr, (u64, u64)>,
    queue: Vec<Fr>,
    pointer: u64,
    queue_expiration: Duration,
    failing_log_queries: u32,
    log_queries: u64,
    revert_next: bool,
    duplicate_logs: bool,
}

impl LedgerState {
    /// start the block the next transaction is mined into; events emitted
    /// while applying it land in this block
    fn open_block(&mut self) {
        self.block_number += 1;
    }

    /// receipt for the single transaction of the current block
    fn receipt(&mut self, status: bool) -> TxReceipt {
        self.tx_count += 1;
        TxReceipt {
            hash: TxHash(keccak256(self.tx_count.to_be_bytes()).0),
            status,
            block_number: self.block_number,
        }
    }

    fn emit(&mut self, leaf: Fr, guardian: Address, operation: Operation, queue_index: u64, index: u64) {
        let log_index = self
            .events
            .iter()
            .filter(|e| e.block_number == self.block_number)
            .count() as u64;
        self.events.push(LeafEvent {
            leaf_hash: leaf,
            guardian,
            operation,
            queue_index,
            index,
            block_number: self.block_number,
            log_index,
        });
    }

    fn path_root(&mut self, leaf: Fr, index: u64, path: &[Fr]) -> Result<Option<Fr>> {
        if path.len() != self.depth || index >= 1u64 << self.depth {
            return Ok(None);
        }
        Ok(Some(compute_root(&mut self.hasher, leaf, index, path)?))
    }

    /// move `leaf` at `index` from `from` to `to` if the path proves `from`
    fn swap_leaf(&mut self, index: u64, path: &[Fr], from: Fr, to: Fr) -> Result<bool> {
        match self.path_root(from, index, path)? {
            Some(root) if root == self.root => {}
            _ => return Ok(false),
        }
        match self.path_root(to, index, path)? {
            Some(root) => {
                self.root = root;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// queued leaves may only be applied at the pointer, inside their window
    fn queue_turn(&self, leaf: &Fr, expected: QueueOperation) -> QueueTurn {
        let Some(info) = self.processing.get(leaf) else {
            return QueueTurn::NotQueued;
        };
        if info.state != expected {
            return QueueTurn::NotQueued;
        }
        let (start, expiration) = self.windows.get(leaf).copied().unwrap_or((0, 0));
        let now = unix_now();
        if info.queue_index != self.pointer || now < start || now > expiration {
            return QueueTurn::Blocked;
        }
        QueueTurn::Ready(info.queue_index)
    }

    fn add(&mut self, sender: Address, call: &RegistryCall) -> Result<bool> {
        if !self.guardians.contains(&sender) {
            debug!("add rejected: {} is not a guardian", sender);
            return Ok(false);
        }
        let queued = match self.queue_turn(&call.leaf_hash, QueueOperation::IssuanceQueued) {
            QueueTurn::NotQueued => None,
            QueueTurn::Ready(queue_index) => Some(queue_index),
            QueueTurn::Blocked => return Ok(false),
        };
        if !self.swap_leaf(call.leaf_index, &call.merkle_proof, empty_leaf(), call.leaf_hash)? {
            debug!("add rejected: path does not prove an empty slot at {}", call.leaf_index);
            return Ok(false);
        }
        if queued.is_some() {
            self.pointer += 1;
        }
        let queue_index = queued.unwrap_or(0);
        self.processing.insert(
            call.leaf_hash,
            ProcessingInfo {
                guardian: sender,
                state: QueueOperation::Processed,
                queue_index,
            },
        );
        self.emit(call.leaf_hash, sender, Operation::Add, queue_index, call.leaf_index);
        Ok(true)
    }

    fn revoke(&mut self, sender: Address, call: &RegistryCall) -> Result<bool> {
        let guardian = self.processing.get(&call.leaf_hash).map(|info| info.guardian);
        if guardian != Some(sender) || !self.guardians.contains(&sender) {
            debug!("revoke rejected: {} did not issue the leaf", sender);
            return Ok(false);
        }
        let queued = match self.queue_turn(&call.leaf_hash, QueueOperation::RevocationQueued) {
            QueueTurn::NotQueued => None,
            QueueTurn::Ready(queue_index) => Some(queue_index),
            QueueTurn::Blocked => return Ok(false),
        };
        if !self.swap_leaf(call.leaf_index, &call.merkle_proof, call.leaf_hash, empty_leaf())? {
            debug!("revoke rejected: path does not prove the leaf at {}", call.leaf_index);
            return Ok(false);
        }
        if queued.is_some() {
            self.pointer += 1;
        }
        let queue_index = queued.unwrap_or(0);
        if let Some(info) = self.processing.get_mut(&call.leaf_hash) {
            info.state = QueueOperation::Processed;
            info.queue_index = queue_index;
        }
        self.emit(call.leaf_hash, sender, Operation::Revoke, queue_index, call.leaf_index);
        Ok(true)
    }

    fn process_next(&mut self, call: &RegistryCall) -> Result<bool> {
        let pointer = self.pointer;
        if self.queue.get(pointer as usize) != Some(&call.leaf_hash) {
            return Ok(false);
        }
        let Some(info) = self.processing.get(&call.leaf_hash).copied() else {
            return Ok(false);
        };
        let (operation, from, to) = match info.state {
            QueueOperation::IssuanceQueued => (Operation::Add, empty_leaf(), call.leaf_hash),
            QueueOperation::RevocationQueued => (Operation::Revoke, call.leaf_hash, empty_leaf()),
            QueueOperation::Processed => return Ok(false),
        };
        if !self.swap_leaf(call.leaf_index, &call.merkle_proof, from, to)? {
            return Ok(false);
        }
        self.pointer += 1;
        if let Some(info) = self.processing.get_mut(&call.leaf_hash) {
            info.state = QueueOperation::Processed;
        }
        self.emit(call.leaf_hash, info.guardian, operation, pointer, call.leaf_index);
        Ok(true)
    }

    fn register(&mut self, sender: Address, leaf: Fr, operation: Operation) -> bool {
        if !self.guardians.contains(&sender) {
            return false;
        }
        let existing = self.processing.get(&leaf).copied();
        if matches!(existing, Some(info) if info.state != QueueOperation::Processed) {
            return false;
        }
        let (state, guardian) = match operation {
            Operation::Add => (QueueOperation::IssuanceQueued, sender),
            Operation::Revoke => match existing {
                Some(info) if info.guardian == sender => (QueueOperation::RevocationQueued, sender),
                _ => return false,
            },
        };
        let queue_index = self.queue.len() as u64;
        self.queue.push(leaf);
        self.processing.insert(
            leaf,
            ProcessingInfo {
                guardian,
                state,
                queue_index,
            },
        );
        let start = unix_now();
        self.windows
            .insert(leaf, (start, start + self.queue_expiration.as_secs()));
        true
    }
}

/// in-process registry ledger; clones made by [`MemoryRegistry::connect`]
/// share one ledger state
#[derive(Clone)]
pub struct MemoryRegistry {
    chain_id: u64,
    address: Address,
    sender: Address,
    state: Arc<Mutex<LedgerState>>,
}

impl MemoryRegistry {
    /// empty ledger of the given tree depth, with [`DEFAULT_GUARDIAN`] as
    /// the only guardian and sender
    pub fn new(depth: usize) -> Result<Self> {
        let empty = SparseMerkleTree::new(depth, PoseidonHash::new()?)?;
        let state = LedgerState {
            depth,
            hasher: PoseidonHash::new()?,
            root: empty.root(),
            block_number: 0,
            tx_count: 0,
            events: Vec::new(),
            guardians: HashSet::from([DEFAULT_GUARDIAN]),
            processing: HashMap::new(),
            windows: HashMap::new(),
            queue: Vec::new(),
            pointer: 0,
            queue_expiration: DEFAULT_QUEUE_EXPIRATION,
            failing_log_queries: 0,
            log_queries: 0,
            revert_next: false,
            duplicate_logs: false,
        };
        Ok(Self {
            chain_id: DEFAULT_CHAIN_ID,
            address: DEFAULT_REGISTRY,
            sender: DEFAULT_GUARDIAN,
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// same ledger, different sending account
    pub fn connect(&self, sender: Address) -> Self {
        Self {
            sender,
            ..self.clone()
        }
    }

    pub fn add_guardian(&self, guardian: Address) {
        self.state.lock().guardians.insert(guardian);
    }

    pub fn root(&self) -> Fr {
        self.state.lock().root
    }

    /// advance the chain by `blocks` empty blocks
    pub fn mine(&self, blocks: u64) {
        self.state.lock().block_number += blocks;
    }

    /// the next `count` log queries fail
    pub fn fail_log_queries(&self, count: u32) {
        self.state.lock().failing_log_queries = count;
    }

    /// number of `leaf_events` calls served so far, failures included
    pub fn log_queries(&self) -> u64 {
        self.state.lock().log_queries
    }

    /// the next submitted call reverts regardless of its content
    pub fn revert_next(&self) {
        self.state.lock().revert_next = true;
    }

    /// deliver every log twice
    pub fn duplicate_logs(&self, enabled: bool) {
        self.state.lock().duplicate_logs = enabled;
    }

    pub fn set_queue_expiration(&self, expiration: Duration) {
        self.state.lock().queue_expiration = expiration;
    }

    pub fn events(&self) -> Vec<LeafEvent> {
        self.state.lock().events.clone()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id)
    }

    fn address(&self) -> Address {
        self.address
    }

    fn sender(&self) -> Address {
        self.sender
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.state.lock().block_number)
    }

    async fn tree_depth(&self) -> Result<usize> {
        Ok(self.state.lock().depth)
    }

    async fn leaf_events(&self, from: u64, to: u64) -> Result<Vec<LeafEvent>> {
        let mut state = self.state.lock();
        state.log_queries += 1;
        if state.failing_log_queries > 0 {
            state.failing_log_queries -= 1;
            return Err(RegistryError::Rpc("injected log query failure".into()));
        }
        let copies = if state.duplicate_logs { 2 } else { 1 };
        let mut out = Vec::new();
        for event in state
            .events
            .iter()
            .filter(|e| e.block_number >= from && e.block_number <= to)
        {
            for _ in 0..copies {
                out.push(event.clone());
            }
        }
        Ok(out)
    }

    async fn submit(&self, call: RegistryCall) -> Result<TxReceipt> {
        let mut state = self.state.lock();
        state.open_block();
        let applied = if std::mem::take(&mut state.revert_next) {
            false
        } else {
            match call.kind {
                CallKind::Add => state.add(self.sender, &call)?,
                CallKind::Revoke => state.revoke(self.sender, &call)?,
                CallKind::ProcessQueue => state.process_next(&call)?,
            }
        };
        Ok(state.receipt(applied))
    }

    async fn register_to_queue(&self, leaf: Fr, operation: Operation) -> Result<TxReceipt> {
        let mut state = self.state.lock();
        state.open_block();
        let applied = state.register(self.sender, leaf, operation);
        Ok(state.receipt(applied))
    }

    async fn queue_pointer(&self) -> Result<u64> {
        Ok(self.state.lock().pointer)
    }

    async fn queue_length(&self) -> Result<u64> {
        Ok(self.state.lock().queue.len() as u64)
    }

    async fn queue_entry(&self, index: u64) -> Result<Fr> {
        self.state
            .lock()
            .queue
            .get(index as usize)
            .copied()
            .ok_or_else(|| RegistryError::Rpc(format!("queue index {} out of range", index)))
    }

    async fn processing_info(&self, leaf: Fr) -> Result<ProcessingInfo> {
        Ok(self
            .state
            .lock()
            .processing
            .get(&leaf)
            .copied()
            .unwrap_or(ProcessingInfo {
                guardian: Address::ZERO,
                state: QueueOperation::Processed,
                queue_index: 0,
            }))
    }

    async fn time_window(&self, leaf: Fr) -> Result<(u64, u64)> {
        Ok(self.state.lock().windows.get(&leaf).copied().unwrap_or((0, 0)))
    }
}
