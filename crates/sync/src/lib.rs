// sync/src/lib.rs

//! Block synchronization engine
//!
//! This crate implements the import side of peer block synchronization:
//! - A shared queue of per-peer block batches consumed by import workers
//! - A per-peer fetch mode state machine (NORMAL, FORWARD, BACKWARD, TORRENT)
//! - A dedup cache of block hashes already imported this session
//! - Disk-backed recovery of blocks that arrived ahead of their parent
//! - Sync statistics reporting
//!
//! The chain itself (validation, canonical head selection, the pending block
//! store) stays behind the [`ChainBackend`] trait.

pub mod backend;
pub mod batch;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod peer_state;
pub mod peers;
pub mod stats;
pub mod worker;

pub use backend::{BranchKey, ChainBackend, ChainError, ChainResult};
pub use batch::{BlockBatch, PeerId};
pub use config::SyncConfig;
pub use dedup::ImportedCache;
pub use engine::SyncEngine;
pub use peer_state::{should_divert_to_torrent, ModeCounts, PeerState, SyncMode};
pub use peers::PeerTable;
pub use stats::SyncStats;
pub use worker::ImportWorker;

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can stop the sync engine
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Storage exhausted: {0}")]
    StorageExhausted(String),

    #[error("Worker error: {0}")]
    WorkerError(String),
}
