//! zkcertd: zk-certificate registry sync daemon
//!
//! ## Usage
//!
//! ```bash
//! # rebuild the tree from ledger history
//! zkcertd --registry 0x... sync
//!
//! # inclusion proof for a leaf index
//! zkcertd --registry 0x... proof --index 3
//!
//! # issue / revoke from the node-managed guardian account
//! zkcertd --registry 0x... --sender 0x... issue --leaf 1234
//! zkcertd --registry 0x... --sender 0x... revoke --leaf 1234 --index 3
//!
//! # drain the ledger queue until ctrl-c
//! zkcertd --registry 0x... --sender 0x... process-queue
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use zkcert_field::{fr_from_decimal, fr_to_decimal, Srs};
use zkcert_registry::{
    Address, JsonRpcRegistry, QueueProcessor, RegistrySynchronizer, SyncConfig,
};
use zkcert_tree::{CommitmentTree, VerkleTree};

#[derive(Parser, Debug)]
#[command(name = "zkcertd")]
#[command(about = "zk-certificate registry sync daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// ledger JSON-RPC endpoint
    #[arg(long, env = "ZKCERT_RPC_URL", default_value = "http://127.0.0.1:8545")]
    rpc_url: String,

    /// registry contract address
    #[arg(long, env = "ZKCERT_REGISTRY")]
    registry: Address,

    /// node-managed account that signs transactions
    #[arg(long, env = "ZKCERT_SENDER")]
    sender: Option<Address>,

    /// registry deployment block
    #[arg(long, default_value_t = 0)]
    first_block: u64,

    /// blocks per log query
    #[arg(long, default_value_t = zkcert_registry::config::BLOCK_WINDOW)]
    block_window: u64,

    /// leaf-log cache directory
    #[arg(long, env = "ZKCERT_CACHE_DIR")]
    cache_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile ledger history and rebuild the tree
    Sync,

    /// Print the inclusion proof for a leaf index as JSON
    Proof {
        #[arg(long)]
        index: u64,
    },

    /// Print the next free leaf index
    FreeIndex,

    /// Add a leaf at the next free index
    Issue {
        /// leaf hash, decimal
        #[arg(long)]
        leaf: String,

        /// go through the ledger queue
        #[arg(long)]
        queued: bool,
    },

    /// Revoke a leaf
    Revoke {
        /// leaf hash, decimal
        #[arg(long)]
        leaf: String,

        #[arg(long)]
        index: u64,

        /// go through the ledger queue
        #[arg(long)]
        queued: bool,
    },

    /// Process the ledger queue until interrupted
    ProcessQueue,

    /// Print a Verkle proof over the reconciled leaves as JSON
    VerkleProof {
        /// SRS table (JSON)
        #[arg(long)]
        srs: PathBuf,

        #[arg(long, default_value_t = 16)]
        width: usize,

        #[arg(long, default_value_t = 8)]
        depth: usize,

        #[arg(long)]
        index: u64,
    },
}

impl Cli {
    fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            first_block: self.first_block,
            block_window: self.block_window,
            cache_dir: self.cache_dir.clone(),
            ..SyncConfig::default()
        }
    }

    fn registry(&self) -> JsonRpcRegistry {
        JsonRpcRegistry::new(
            &self.rpc_url,
            self.registry,
            self.sender.unwrap_or(Address::ZERO),
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zkcertd=info,zkcert_registry=info".into()),
        )
        .init();

    let cli = Cli::parse();

    info!("registry {} via {}", cli.registry, cli.rpc_url);

    let needs_sender = matches!(
        cli.command,
        Commands::Issue { .. } | Commands::Revoke { .. } | Commands::ProcessQueue
    );
    if needs_sender && cli.sender.is_none() {
        anyhow::bail!("--sender (or ZKCERT_SENDER) is required to send transactions");
    }

    let mut sync = RegistrySynchronizer::new(cli.registry(), cli.sync_config())
        .await
        .context("failed to connect to registry")?;
    let leaves = sync
        .sync(|p| debug!("reconciled {}%", p))
        .await
        .context("failed to sync registry")?;

    match cli.command {
        Commands::Sync => {
            println!("leaves: {}", leaves);
            println!("root: {}", fr_to_decimal(&sync.root()));
        }

        Commands::Proof { index } => {
            let proof = sync.proof(index)?;
            println!("{}", serde_json::to_string_pretty(&proof)?);
        }

        Commands::FreeIndex => {
            println!("{}", sync.tree().free_leaf_index()?);
        }

        Commands::Issue { leaf, queued } => {
            let leaf = fr_from_decimal(&leaf).context("invalid leaf")?;
            let (proof, registration) = if queued {
                sync.issue_queued(leaf).await?
            } else {
                sync.issue(leaf).await?
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "registration": registration,
                    "merkleProof": proof,
                }))?
            );
        }

        Commands::Revoke { leaf, index, queued } => {
            let leaf = fr_from_decimal(&leaf).context("invalid leaf")?;
            let proof = if queued {
                sync.revoke_queued(leaf, index).await?
            } else {
                sync.revoke(leaf, index).await?
            };
            println!("{}", serde_json::to_string_pretty(&proof)?);
        }

        Commands::ProcessQueue => {
            let mut processor = QueueProcessor::new(sync);
            let shutdown = processor.shutdown_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("ctrl-c received, finishing current operation");
                    shutdown.request();
                }
            });
            processor.run().await;
        }

        Commands::VerkleProof {
            srs,
            width,
            depth,
            index,
        } => {
            let srs = Srs::load(&srs)
                .with_context(|| format!("failed to load SRS from {}", srs.display()))?;
            let mut tree = VerkleTree::new(depth, width, Arc::new(srs))?;
            let (indices, values): (Vec<u64>, Vec<_>) = sync.tree().leaves().into_iter().unzip();
            tree.insert_leaves(&values, &indices)?;
            info!("verkle tree built with {} leaves", indices.len());
            let proof = tree.create_proof(index)?;
            println!("{}", serde_json::to_string_pretty(&proof)?);
        }
    }

    Ok(())
}
