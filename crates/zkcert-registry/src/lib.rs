//! zkcert-registry: keeps an off-chain tree in step with the ledger registry
//!
//! - [`reconcile_leaves`] folds the registry's event history (plus an
//!   on-disk cache) into the active leaf set
//! - [`RegistrySynchronizer`] rebuilds the tree from it and performs
//!   issue / revoke, directly or through the ledger queue
//! - [`QueueProcessor`] drains the ledger queue as a long-running service
//!
//! the ledger itself sits behind the [`Registry`] trait, implemented by
//! [`JsonRpcRegistry`] for real nodes and [`MemoryRegistry`] for local
//! simulation.

pub mod abi;
pub mod cache;
pub mod config;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod queue;
pub mod reconcile;
pub mod rpc;
pub mod sync;
pub mod types;

pub use cache::LeafLogCache;
pub use config::SyncConfig;
pub use error::{RegistryError, Result};
pub use ledger::Registry;
pub use memory::MemoryRegistry;
pub use queue::{QueueProcessor, ShutdownHandle, Step};
pub use reconcile::reconcile_leaves;
pub use rpc::JsonRpcRegistry;
pub use sync::{RegistrySynchronizer, RegistryTree};
pub use types::{
    Address, CallKind, LeafEntry, LeafEvent, Operation, ProcessingInfo, QueueOperation,
    RegistryCall, TxHash, TxReceipt, ZkCertRegistration,
};
