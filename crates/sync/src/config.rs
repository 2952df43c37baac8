// sync/src/config.rs

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the sync engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Number of import worker tasks pulling from the shared batch queue
    pub workers: usize,
    /// Capacity of the shared batch queue
    pub queue_capacity: usize,
    /// Ceiling on consecutive no-progress cycles before the anti-stall
    /// policy forces a peer back to NORMAL mode
    pub max_repeats: u32,
    /// Minimum wait between header requests to the same peer
    pub request_cooldown_ms: u64,
    /// Capacity of the imported-hash dedup cache
    pub dedup_capacity: usize,
}

impl SyncConfig {
    /// Header request cooldown as a [`Duration`]
    pub fn request_cooldown(&self) -> Duration {
        Duration::from_millis(self.request_cooldown_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_capacity: 128,
            max_repeats: 3,
            request_cooldown_ms: 5000,
            dedup_capacity: 262_144,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.workers, 1);
        assert_eq!(config.queue_capacity, 128);
        assert_eq!(config.max_repeats, 3);
        assert_eq!(config.request_cooldown(), Duration::from_secs(5));
        assert!(config.dedup_capacity > 0);
    }
}
