//! queue processor against the in-memory ledger

use std::time::Duration;
use zkcert_field::Fr;
use zkcert_registry::{
    MemoryRegistry, Operation, QueueProcessor, Registry, RegistrySynchronizer, Step, SyncConfig,
};
use zkcert_tree::{empty_leaf, CommitmentTree};

fn fast_config() -> SyncConfig {
    SyncConfig {
        retry_base_delay: Duration::from_millis(1),
        processor_idle_interval: Duration::from_millis(10),
        processor_backoff: Duration::from_millis(10),
        ..SyncConfig::default()
    }
}

/// two issued leaves, then a queue of: add 30, add 40, revoke 10
async fn mixed_queue() -> (MemoryRegistry, QueueProcessor<MemoryRegistry>) {
    let ledger = MemoryRegistry::new(10).unwrap();
    let mut sync = RegistrySynchronizer::new(ledger.clone(), fast_config()).await.unwrap();
    sync.issue(Fr::from(10u64)).await.unwrap();
    sync.issue(Fr::from(20u64)).await.unwrap();

    for (leaf, op) in [(30u64, Operation::Add), (40, Operation::Add), (10, Operation::Revoke)] {
        let receipt = ledger.register_to_queue(Fr::from(leaf), op).await.unwrap();
        assert!(receipt.status);
    }

    let mut processor_sync = RegistrySynchronizer::new(ledger.clone(), fast_config()).await.unwrap();
    processor_sync.sync(|_| {}).await.unwrap();
    (ledger, QueueProcessor::new(processor_sync))
}

#[tokio::test]
async fn test_process_next_drains_mixed_queue() {
    let (ledger, mut processor) = mixed_queue().await;

    let mut applied = Vec::new();
    loop {
        match processor.process_next().await.unwrap() {
            Step::Idle => break,
            Step::Applied { leaf, index, operation } => applied.push((leaf, index, operation)),
        }
    }

    assert_eq!(
        applied,
        vec![
            (Fr::from(30u64), 2, Operation::Add),
            (Fr::from(40u64), 3, Operation::Add),
            (Fr::from(10u64), 0, Operation::Revoke),
        ]
    );
    assert_eq!(ledger.queue_pointer().await.unwrap(), 3);
    assert_eq!(processor.synchronizer().root(), ledger.root());

    let tree = processor.synchronizer().tree();
    assert_eq!(tree.retrieve_leaf(0, 0).unwrap(), empty_leaf());
    assert_eq!(tree.leaf_index(&Fr::from(40u64)), Some(3));
}

#[tokio::test]
async fn test_empty_queue_is_idle() {
    let ledger = MemoryRegistry::new(8).unwrap();
    let sync = RegistrySynchronizer::new(ledger.clone(), fast_config()).await.unwrap();
    let mut processor = QueueProcessor::new(sync);
    assert_eq!(processor.process_next().await.unwrap(), Step::Idle);
}

#[tokio::test]
async fn test_run_retries_and_stops_on_shutdown() {
    let (ledger, mut processor) = mixed_queue().await;
    let shutdown = processor.shutdown_handle();
    // first attempt reverts, the loop backs off and tries again
    ledger.revert_next();

    let task = tokio::spawn(async move {
        processor.run().await;
        processor
    });

    let drained = async {
        while ledger.queue_pointer().await.unwrap() < ledger.queue_length().await.unwrap() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), drained)
        .await
        .unwrap();

    shutdown.request();
    let processor = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(processor.synchronizer().root(), ledger.root());
}
