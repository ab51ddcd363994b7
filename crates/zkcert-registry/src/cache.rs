//! on-disk leaf-log cache
//!
//! one JSON file per (registry, chain) holding the reconciled leaf set and
//! the last block it covers, so the next run only scans newer blocks.

use crate::error::Result;
use crate::types::{Address, LeafEntry};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafLogCache {
    pub chain_id: u64,
    pub registry_address: Address,
    pub last_block_considered: u64,
    pub leaf_log_results: Vec<LeafEntry>,
}

impl LeafLogCache {
    pub fn path(dir: &Path, registry: &Address, chain_id: u64) -> PathBuf {
        dir.join(format!("merkle_cache_{}_{}.json", registry, chain_id))
    }

    /// `Ok(None)` when nothing was cached yet for this registry
    pub fn load(dir: &Path, registry: &Address, chain_id: u64) -> Result<Option<Self>> {
        let path = Self::path(dir, registry, chain_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        let cache: LeafLogCache = serde_json::from_str(&raw)?;
        // a file copied between deployments must not leak leaves
        if cache.chain_id != chain_id || cache.registry_address != *registry {
            return Ok(None);
        }
        Ok(Some(cache))
    }

    pub fn store(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = Self::path(dir, &self.registry_address, self.chain_id);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}
