// sync/src/backend.rs

use chain_core::{Block, BlockNumber, ImportResult};
use chain_crypto::Hash;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Result type for chain collaborator calls
pub type ChainResult<T> = Result<T, ChainError>;

/// Errors surfaced by the chain collaborator
#[derive(Debug, Error)]
pub enum ChainError {
    /// The underlying store ran out of disk space; sync cannot continue
    #[error("no space left on device: {0}")]
    DiskFull(String),
    /// A block failed to import for a reason other than a missing parent
    #[error("block import failed: {0}")]
    Import(String),
    /// The pending block store rejected a read or write
    #[error("pending block store failed: {0}")]
    PendingStore(String),
}

impl ChainError {
    /// Whether this error means the node has no usable disk left
    pub fn is_disk_full(&self) -> bool {
        matches!(self, ChainError::DiskFull(_))
    }
}

/// Identifier for one stored run of orphaned blocks
///
/// A parked run is keyed by the hash of its first block. Re-storing an
/// overlapping suffix therefore lands in the same queue instead of
/// duplicating it, and distinct forks at the same height stay separate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchKey(pub Hash);

impl From<Hash> for BranchKey {
    fn from(hash: Hash) -> Self {
        BranchKey(hash)
    }
}

impl fmt::Display for BranchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.short_hex())
    }
}

/// Chain operations the sync workers drive
///
/// Implementations must be safe to call from several workers at once.
pub trait ChainBackend: Send + Sync {
    /// Try to connect a block to the chain
    ///
    /// Returns how the block landed; hard failures (storage faults,
    /// consensus-level rejections) come back as errors instead.
    fn try_connect(&self, block: &Block) -> ChainResult<ImportResult>;

    /// Current canonical best height
    fn best_height(&self) -> BlockNumber;

    /// Whether state pruning is active on this node
    fn pruning_enabled(&self) -> bool;

    /// Whether a pruning node must refuse blocks at this height
    fn is_prune_restricted(&self, number: BlockNumber) -> bool;

    /// Next TORRENT range base for a peer, given the current best height
    fn next_torrent_base(&self, best: BlockNumber) -> BlockNumber;

    /// Park a contiguous run of blocks that could not be connected yet
    ///
    /// The run is stored under the level of its first block, keyed by that
    /// block's hash. Returns how many blocks were newly stored; blocks the
    /// store already held do not count.
    fn store_pending_range(&self, blocks: &[Block]) -> ChainResult<usize>;

    /// Load every parked run whose first block sits at the given level
    fn load_pending_at_level(
        &self,
        level: BlockNumber,
    ) -> ChainResult<HashMap<BranchKey, Vec<Block>>>;

    /// Delete parked runs that were fully replayed
    ///
    /// `loaded` is the snapshot returned by [`Self::load_pending_at_level`]
    /// for the same level; only the runs named in `consumed` are dropped.
    fn drop_consumed(
        &self,
        level: BlockNumber,
        consumed: &[BranchKey],
        loaded: &HashMap<BranchKey, Vec<Block>>,
    );
}
