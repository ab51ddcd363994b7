//! sync engine tuning

use std::path::PathBuf;
use std::time::Duration;

/// blocks per `eth_getLogs` window
pub const BLOCK_WINDOW: u64 = 10_000;
/// attempts per log window before giving up
pub const MAX_QUERY_RETRIES: u32 = 5;
/// first backoff; doubles per attempt (100ms, 200ms, 400ms, ...)
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);
/// leaves per tree insertion batch
pub const TREE_BATCH_SIZE: usize = 1_000;
pub const QUEUE_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const PROCESSOR_IDLE_INTERVAL: Duration = Duration::from_secs(10);
pub const PROCESSOR_BACKOFF: Duration = Duration::from_secs(15);
pub const CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// registry deployment block, nothing earlier is scanned
    pub first_block: u64,
    pub block_window: u64,
    pub max_query_retries: u32,
    pub retry_base_delay: Duration,
    pub tree_batch_size: usize,
    /// leaf-log cache directory; no caching when unset
    pub cache_dir: Option<PathBuf>,
    pub queue_poll_interval: Duration,
    pub processor_idle_interval: Duration,
    pub processor_backoff: Duration,
    pub confirmation_poll_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            first_block: 0,
            block_window: BLOCK_WINDOW,
            max_query_retries: MAX_QUERY_RETRIES,
            retry_base_delay: RETRY_BASE_DELAY,
            tree_batch_size: TREE_BATCH_SIZE,
            cache_dir: None,
            queue_poll_interval: QUEUE_POLL_INTERVAL,
            processor_idle_interval: PROCESSOR_IDLE_INTERVAL,
            processor_backoff: PROCESSOR_BACKOFF,
            confirmation_poll_interval: CONFIRMATION_POLL_INTERVAL,
        }
    }
}

impl SyncConfig {
    /// backoff before retry number `attempt` (0-based)
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.retry_base_delay * (1u32 << attempt.min(16))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let config = SyncConfig::default();
        assert_eq!(config.retry_delay(0), Duration::from_millis(100));
        assert_eq!(config.retry_delay(1), Duration::from_millis(200));
        assert_eq!(config.retry_delay(2), Duration::from_millis(400));
    }
}
