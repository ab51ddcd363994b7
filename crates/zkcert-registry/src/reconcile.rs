//! chain log reconciliation
//!
//! Turns the registry's `ZkCertificateProcessed` history into the set of
//! currently active (leaf, index) pairs.
//!
//! 1. load cached results for (chain, registry), if any
//! 2. scan block windows after the cached point, retrying each window with
//!    exponential backoff
//! 3. drop re-delivered logs (same block number and log index)
//! 4. pair every revocation with the first identical issuance; both drop out
//! 5. a revocation without an issuance means the history is incomplete: fatal
//! 6. persist the result for the next run

use crate::cache::LeafLogCache;
use crate::config::SyncConfig;
use crate::error::{RegistryError, Result};
use crate::ledger::Registry;
use crate::types::{LeafEntry, LeafEvent, Operation};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use zkcert_field::fr_to_decimal;

/// Active leaves of `registry`, in issuance order.
///
/// `on_progress` receives integer percentages ("0" to "100") as log windows
/// complete.
pub async fn reconcile_leaves<R, F>(
    registry: &R,
    config: &SyncConfig,
    mut on_progress: F,
) -> Result<Vec<LeafEntry>>
where
    R: Registry + ?Sized,
    F: FnMut(&str),
{
    let chain_id = registry.chain_id().await?;
    let address = registry.address();

    let cached = match &config.cache_dir {
        Some(dir) => match LeafLogCache::load(dir, &address, chain_id) {
            Ok(cache) => cache,
            Err(e) => {
                warn!("ignoring unreadable leaf cache in {}: {}", dir.display(), e);
                None
            }
        },
        None => None,
    };

    let current = registry.block_number().await?;

    if let Some(cache) = &cached {
        if cache.last_block_considered >= current {
            info!(
                "leaf cache is current at block {} ({} leaves)",
                cache.last_block_considered,
                cache.leaf_log_results.len()
            );
            on_progress("100");
            return Ok(cache.leaf_log_results.clone());
        }
    }

    let start = match &cached {
        Some(cache) => config.first_block.max(cache.last_block_considered + 1),
        None => config.first_block,
    };

    info!(
        "scanning registry {} on chain {} for leaf logs: blocks {} -> {}",
        address, chain_id, start, current
    );
    on_progress("0");

    let mut events = Vec::new();
    if start <= current {
        let window = config.block_window.max(1);
        let total = current - start + 1;
        let mut from = start;
        while from <= current {
            let to = from.saturating_add(window - 1).min(current);
            let mut batch = fetch_window(registry, config, from, to).await?;
            debug!("blocks {} -> {}: {} logs", from, to, batch.len());
            events.append(&mut batch);

            let progress = ((to - start + 1) * 100) / total;
            on_progress(&progress.to_string());

            if to == current {
                break;
            }
            from = to + 1;
        }
    } else {
        on_progress("100");
    }

    let previous = cached.map(|c| c.leaf_log_results).unwrap_or_default();
    let leaves = match_events(previous, dedup_events(events))?;

    info!("reconciled {} active leaves up to block {}", leaves.len(), current);

    if let Some(dir) = &config.cache_dir {
        let cache = LeafLogCache {
            chain_id,
            registry_address: address,
            last_block_considered: current,
            leaf_log_results: leaves.clone(),
        };
        if let Err(e) = cache.store(dir) {
            warn!("failed to write leaf cache to {}: {}", dir.display(), e);
        }
    }

    Ok(leaves)
}

/// one log window with exponential backoff between attempts
async fn fetch_window<R: Registry + ?Sized>(
    registry: &R,
    config: &SyncConfig,
    from: u64,
    to: u64,
) -> Result<Vec<LeafEvent>> {
    let attempts = config.max_query_retries.max(1);
    let mut last_err = None;
    for attempt in 0..attempts {
        match registry.leaf_events(from, to).await {
            Ok(events) => return Ok(events),
            Err(e) => {
                warn!(
                    "log query {} -> {} failed (attempt {}/{}): {}",
                    from,
                    to,
                    attempt + 1,
                    attempts,
                    e
                );
                last_err = Some(e);
                if attempt + 1 < attempts {
                    tokio::time::sleep(config.retry_delay(attempt)).await;
                }
            }
        }
    }
    Err(RegistryError::RetriesExhausted {
        from,
        to,
        attempts,
        last: last_err.map(|e| e.to_string()).unwrap_or_default(),
    })
}

/// keep the first delivery of every (block, log index)
pub fn dedup_events(events: Vec<LeafEvent>) -> Vec<LeafEvent> {
    let mut seen = HashSet::with_capacity(events.len());
    let before = events.len();
    let unique: Vec<LeafEvent> = events
        .into_iter()
        .filter(|e| seen.insert((e.block_number, e.log_index)))
        .collect();
    if unique.len() != before {
        debug!("dropped {} re-delivered logs", before - unique.len());
    }
    unique
}

/// Fold new events into previously reconciled leaves.
///
/// Each issuance consumes the first unconsumed revocation with the same
/// (leaf, index); any revocation left over is an orphan.
pub fn match_events(previous: Vec<LeafEntry>, events: Vec<LeafEvent>) -> Result<Vec<LeafEntry>> {
    let mut added = previous;
    let mut revoked: Vec<(LeafEntry, bool)> = Vec::new();
    for event in events {
        let entry = LeafEntry::new(event.leaf_hash, event.index);
        match event.operation {
            Operation::Add => added.push(entry),
            Operation::Revoke => revoked.push((entry, false)),
        }
    }

    let mut active = Vec::with_capacity(added.len());
    for entry in added {
        match revoked.iter_mut().find(|(r, consumed)| !*consumed && *r == entry) {
            Some((_, consumed)) => *consumed = true,
            None => active.push(entry),
        }
    }

    if let Some((orphan, _)) = revoked.iter().find(|(_, consumed)| !*consumed) {
        return Err(RegistryError::OrphanRevocation {
            leaf: fr_to_decimal(&orphan.leaf_hash),
            index: orphan.index,
        });
    }

    Ok(active)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;
    use zkcert_field::Fr;

    fn event(op: Operation, leaf: u64, index: u64, block: u64) -> LeafEvent {
        LeafEvent {
            leaf_hash: Fr::from(leaf),
            guardian: Address::ZERO,
            operation: op,
            queue_index: 0,
            index,
            block_number: block,
            log_index: 0,
        }
    }

    #[test]
    fn test_revoke_cancels_matching_add() {
        let events = vec![
            event(Operation::Add, 10, 0, 1),
            event(Operation::Add, 11, 1, 2),
            event(Operation::Revoke, 10, 0, 3),
        ];
        let active = match_events(vec![], events).unwrap();
        assert_eq!(active, vec![LeafEntry::new(Fr::from(11u64), 1)]);
    }

    #[test]
    fn test_reissue_after_revoke_survives() {
        let events = vec![
            event(Operation::Add, 10, 0, 1),
            event(Operation::Revoke, 10, 0, 2),
            event(Operation::Add, 10, 0, 3),
        ];
        let active = match_events(vec![], events).unwrap();
        assert_eq!(active, vec![LeafEntry::new(Fr::from(10u64), 0)]);
    }

    #[test]
    fn test_revoke_of_cached_leaf() {
        let previous = vec![LeafEntry::new(Fr::from(1u64), 0), LeafEntry::new(Fr::from(2u64), 1)];
        let active = match_events(previous, vec![event(Operation::Revoke, 1, 0, 9)]).unwrap();
        assert_eq!(active, vec![LeafEntry::new(Fr::from(2u64), 1)]);
    }

    #[test]
    fn test_orphan_revoke_is_fatal() {
        let events = vec![
            event(Operation::Add, 10, 0, 1),
            event(Operation::Revoke, 10, 5, 2),
        ];
        match match_events(vec![], events) {
            Err(RegistryError::OrphanRevocation { leaf, index }) => {
                assert_eq!(leaf, "10");
                assert_eq!(index, 5);
            }
            other => panic!("expected orphan revocation, got {:?}", other),
        }
    }

    #[test]
    fn test_dedup_by_block_and_log_index() {
        let mut second = event(Operation::Add, 11, 1, 1);
        second.log_index = 1;
        let events = vec![
            event(Operation::Add, 10, 0, 1),
            event(Operation::Add, 10, 0, 1),
            second.clone(),
            second,
        ];
        let unique = dedup_events(events);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[1].log_index, 1);
    }
}
