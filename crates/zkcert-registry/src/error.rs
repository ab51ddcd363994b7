use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("log query for blocks {from}..={to} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        from: u64,
        to: u64,
        attempts: u32,
        last: String,
    },

    #[error("revocation of leaf {leaf} at index {index} has no matching issuance")]
    OrphanRevocation { leaf: String, index: u64 },

    #[error("leaf at index {index} is {found}, expected {expected}")]
    LeafMismatch {
        index: u64,
        expected: String,
        found: String,
    },

    #[error("{caller} is not the guardian of leaf {leaf} (issued by {guardian})")]
    Unauthorized {
        leaf: String,
        caller: String,
        guardian: String,
    },

    #[error("leaf {leaf} is not in the tree")]
    UnknownLeaf { leaf: String },

    #[error("transaction {tx} reverted")]
    TransactionReverted { tx: String },

    #[error("queue slot {queue_index} for leaf {leaf} expired before it was processed")]
    QueueExpired { leaf: String, queue_index: u64 },

    #[error("ledger RPC error: {0}")]
    Rpc(String),

    #[error("abi error: {0}")]
    Abi(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("tree error: {0}")]
    Tree(#[from] zkcert_tree::TreeError),

    #[error("field error: {0}")]
    Field(#[from] zkcert_field::FieldError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Cache(err.to_string())
    }
}

impl From<alloy_sol_types::Error> for RegistryError {
    fn from(err: alloy_sol_types::Error) -> Self {
        RegistryError::Abi(err.to_string())
    }
}
