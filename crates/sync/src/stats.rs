// sync/src/stats.rs

use chain_core::BlockNumber;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Sync progress counters shared across workers
pub struct SyncStats {
    started: Instant,
    start_height: AtomicU64,
    best: AtomicU64,
    cycles: AtomicU64,
}

impl SyncStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            start_height: AtomicU64::new(0),
            best: AtomicU64::new(0),
            cycles: AtomicU64::new(0),
        }
    }

    /// Record the height sync started from
    pub fn begin(&self, height: BlockNumber) {
        self.start_height.store(height, Ordering::Relaxed);
        self.best.store(height, Ordering::Relaxed);
    }

    /// Record the chain's best height at the end of a worker cycle
    pub fn record_best(&self, height: BlockNumber) {
        self.best.store(height, Ordering::Relaxed);
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn best(&self) -> BlockNumber {
        self.best.load(Ordering::Relaxed)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Average imported blocks per second since sync began
    pub fn throughput(&self) -> f64 {
        let gained = self
            .best
            .load(Ordering::Relaxed)
            .saturating_sub(self.start_height.load(Ordering::Relaxed));
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            gained as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl Default for SyncStats {
    fn default() -> Self {
        Self::new()
    }
}
