//! reconciliation against the in-memory ledger

use proptest::prelude::*;
use std::collections::BTreeSet;
use std::time::Duration;
use zkcert_field::Fr;
use zkcert_registry::{
    reconcile_leaves, LeafEntry, LeafLogCache, MemoryRegistry, Registry, RegistryError,
    RegistrySynchronizer, SyncConfig,
};

fn fast_config() -> SyncConfig {
    SyncConfig {
        block_window: 3,
        retry_base_delay: Duration::from_millis(1),
        ..SyncConfig::default()
    }
}

fn sorted(leaves: Vec<LeafEntry>) -> Vec<(u64, Fr)> {
    let mut out: Vec<(u64, Fr)> = leaves.into_iter().map(|e| (e.index, e.leaf_hash)).collect();
    out.sort_by_key(|(i, _)| *i);
    out
}

async fn issue_all(sync: &mut RegistrySynchronizer<MemoryRegistry>, leaves: &[u64]) {
    for leaf in leaves {
        sync.issue(Fr::from(*leaf)).await.unwrap();
    }
}

#[tokio::test]
async fn test_active_set_is_adds_minus_revokes() {
    let ledger = MemoryRegistry::new(8).unwrap();
    let mut sync = RegistrySynchronizer::new(ledger.clone(), fast_config()).await.unwrap();
    issue_all(&mut sync, &[10, 11, 12, 13]).await;
    sync.revoke(Fr::from(11u64), 1).await.unwrap();
    sync.revoke(Fr::from(13u64), 3).await.unwrap();

    let leaves = reconcile_leaves(&ledger, &fast_config(), |_| {}).await.unwrap();
    assert_eq!(
        leaves,
        vec![
            LeafEntry::new(Fr::from(10u64), 0),
            LeafEntry::new(Fr::from(12u64), 2),
        ]
    );
}

#[tokio::test]
async fn test_revoke_before_scan_start_is_orphan() {
    let ledger = MemoryRegistry::new(8).unwrap();
    let mut sync = RegistrySynchronizer::new(ledger.clone(), fast_config()).await.unwrap();
    issue_all(&mut sync, &[10]).await;
    let issued_at = ledger.block_number().await.unwrap();
    sync.revoke(Fr::from(10u64), 0).await.unwrap();

    let config = SyncConfig {
        first_block: issued_at + 1,
        ..fast_config()
    };
    match reconcile_leaves(&ledger, &config, |_| {}).await {
        Err(RegistryError::OrphanRevocation { leaf, index }) => {
            assert_eq!(leaf, "10");
            assert_eq!(index, 0);
        }
        other => panic!("expected orphan revocation, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cached_runs_match_fresh_run() {
    let cache_dir = tempfile::tempdir().unwrap();
    let cached = SyncConfig {
        cache_dir: Some(cache_dir.path().to_path_buf()),
        ..fast_config()
    };

    let ledger = MemoryRegistry::new(8).unwrap();
    let mut sync = RegistrySynchronizer::new(ledger.clone(), fast_config()).await.unwrap();
    issue_all(&mut sync, &[1, 2, 3]).await;

    let first = reconcile_leaves(&ledger, &cached, |_| {}).await.unwrap();
    assert_eq!(first.len(), 3);

    // revoke a leaf the cache already holds, then add more
    sync.revoke(Fr::from(2u64), 1).await.unwrap();
    issue_all(&mut sync, &[4, 5]).await;
    ledger.mine(7);

    let second = reconcile_leaves(&ledger, &cached, |_| {}).await.unwrap();
    let fresh = reconcile_leaves(&ledger, &fast_config(), |_| {}).await.unwrap();
    assert_eq!(sorted(second), sorted(fresh));

    let stored = LeafLogCache::load(cache_dir.path(), &ledger.address(), ledger.chain_id().await.unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(stored.last_block_considered, ledger.block_number().await.unwrap());
}

#[tokio::test]
async fn test_current_cache_skips_log_queries() {
    let cache_dir = tempfile::tempdir().unwrap();
    let config = SyncConfig {
        cache_dir: Some(cache_dir.path().to_path_buf()),
        ..fast_config()
    };
    let ledger = MemoryRegistry::new(8).unwrap();
    let mut sync = RegistrySynchronizer::new(ledger.clone(), fast_config()).await.unwrap();
    issue_all(&mut sync, &[7, 8]).await;

    let first = reconcile_leaves(&ledger, &config, |_| {}).await.unwrap();
    let queries = ledger.log_queries();
    let again = reconcile_leaves(&ledger, &config, |_| {}).await.unwrap();
    assert_eq!(first, again);
    assert_eq!(ledger.log_queries(), queries);
}

#[tokio::test]
async fn test_unreadable_cache_is_ignored() {
    let cache_dir = tempfile::tempdir().unwrap();
    let ledger = MemoryRegistry::new(8).unwrap();
    let mut sync = RegistrySynchronizer::new(ledger.clone(), fast_config()).await.unwrap();
    issue_all(&mut sync, &[7]).await;

    let path = LeafLogCache::path(cache_dir.path(), &ledger.address(), ledger.chain_id().await.unwrap());
    std::fs::write(&path, "garbage").unwrap();

    let config = SyncConfig {
        cache_dir: Some(cache_dir.path().to_path_buf()),
        ..fast_config()
    };
    let leaves = reconcile_leaves(&ledger, &config, |_| {}).await.unwrap();
    assert_eq!(leaves, vec![LeafEntry::new(Fr::from(7u64), 0)]);
    // rewritten with the fresh result
    assert!(LeafLogCache::load(cache_dir.path(), &ledger.address(), ledger.chain_id().await.unwrap())
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_unwritable_cache_does_not_abort() {
    let scratch = tempfile::tempdir().unwrap();
    let blocker = scratch.path().join("not-a-dir");
    std::fs::write(&blocker, "file").unwrap();

    let ledger = MemoryRegistry::new(8).unwrap();
    let mut sync = RegistrySynchronizer::new(ledger.clone(), fast_config()).await.unwrap();
    issue_all(&mut sync, &[4, 5, 6]).await;
    sync.revoke(Fr::from(5u64), 1).await.unwrap();

    // create_dir_all fails below a regular file
    let config = SyncConfig {
        cache_dir: Some(blocker.join("cache")),
        ..fast_config()
    };
    let leaves = reconcile_leaves(&ledger, &config, |_| {}).await.unwrap();
    assert_eq!(
        leaves,
        vec![
            LeafEntry::new(Fr::from(4u64), 0),
            LeafEntry::new(Fr::from(6u64), 2),
        ]
    );
    assert!(!blocker.join("cache").exists());
}

#[tokio::test]
async fn test_transient_query_failures_are_retried() {
    let ledger = MemoryRegistry::new(8).unwrap();
    let mut sync = RegistrySynchronizer::new(ledger.clone(), fast_config()).await.unwrap();
    issue_all(&mut sync, &[1, 2]).await;

    ledger.fail_log_queries(2);
    let config = SyncConfig {
        max_query_retries: 3,
        ..fast_config()
    };
    let leaves = reconcile_leaves(&ledger, &config, |_| {}).await.unwrap();
    assert_eq!(leaves.len(), 2);
}

#[tokio::test]
async fn test_exhausted_retries_are_fatal() {
    let ledger = MemoryRegistry::new(8).unwrap();
    let mut sync = RegistrySynchronizer::new(ledger.clone(), fast_config()).await.unwrap();
    issue_all(&mut sync, &[1]).await;

    ledger.fail_log_queries(10);
    let config = SyncConfig {
        max_query_retries: 3,
        ..fast_config()
    };
    match reconcile_leaves(&ledger, &config, |_| {}).await {
        Err(RegistryError::RetriesExhausted { from, to, attempts, .. }) => {
            assert_eq!((from, to), (0, 1));
            assert_eq!(attempts, 3);
        }
        other => panic!("expected retry exhaustion, got {:?}", other),
    }
    assert_eq!(ledger.log_queries(), 3);
}

#[tokio::test]
async fn test_duplicate_delivery_is_suppressed() {
    let ledger = MemoryRegistry::new(8).unwrap();
    let mut sync = RegistrySynchronizer::new(ledger.clone(), fast_config()).await.unwrap();
    issue_all(&mut sync, &[1, 2]).await;
    sync.revoke(Fr::from(1u64), 0).await.unwrap();

    ledger.duplicate_logs(true);
    let leaves = reconcile_leaves(&ledger, &fast_config(), |_| {}).await.unwrap();
    assert_eq!(leaves, vec![LeafEntry::new(Fr::from(2u64), 1)]);
}

#[tokio::test]
async fn test_progress_reports_percentages() {
    let ledger = MemoryRegistry::new(8).unwrap();
    ledger.mine(10);

    let mut reports: Vec<String> = Vec::new();
    reconcile_leaves(&ledger, &fast_config(), |p| reports.push(p.to_string()))
        .await
        .unwrap();

    // blocks 0..=10 in windows of 3
    assert_eq!(reports, vec!["0", "27", "54", "81", "100"]);
}

#[derive(Debug, Clone)]
enum Op {
    Issue,
    Revoke(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => Just(Op::Issue),
        1 => any::<usize>().prop_map(Op::Revoke),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_reconcile_matches_live_set(ops in prop::collection::vec(op_strategy(), 1..24)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (expected, reconciled) = rt.block_on(async {
            let ledger = MemoryRegistry::new(6).unwrap();
            let mut sync = RegistrySynchronizer::new(ledger.clone(), fast_config()).await.unwrap();
            let mut live: Vec<(u64, Fr)> = Vec::new();
            let mut next_leaf = 1000u64;

            for op in ops {
                match op {
                    Op::Revoke(pick) if !live.is_empty() => {
                        let (index, leaf) = live.remove(pick % live.len());
                        sync.revoke(leaf, index).await.unwrap();
                    }
                    _ => {
                        let leaf = Fr::from(next_leaf);
                        next_leaf += 1;
                        let (proof, _) = sync.issue(leaf).await.unwrap();
                        live.push((proof.leaf_index(), leaf));
                    }
                }
            }

            let reconciled = reconcile_leaves(&ledger, &fast_config(), |_| {}).await.unwrap();
            let expected: BTreeSet<(u64, Fr)> = live.into_iter().collect();
            (expected, reconciled)
        });

        let reconciled: BTreeSet<(u64, Fr)> =
            reconciled.into_iter().map(|e| (e.index, e.leaf_hash)).collect();
        prop_assert_eq!(reconciled, expected);
    }
}
