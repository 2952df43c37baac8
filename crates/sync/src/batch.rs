// sync/src/batch.rs

use chain_core::Block;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric key identifying a peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ordered run of blocks downloaded from one peer
///
/// Created by the fetch layer, moved into the shared queue and consumed
/// exactly once by one import worker cycle.
#[derive(Debug, Clone)]
pub struct BlockBatch {
    /// Peer the blocks were downloaded from
    pub peer: PeerId,
    /// Human-readable peer identifier for log lines
    pub display_id: String,
    /// Blocks in ascending height order
    pub blocks: Vec<Block>,
}

impl BlockBatch {
    pub fn new(peer: PeerId, display_id: impl Into<String>, blocks: Vec<Block>) -> Self {
        Self {
            peer,
            display_id: display_id.into(),
            blocks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_display() {
        assert_eq!(PeerId(42).to_string(), "42");
    }

    #[test]
    fn test_batch_construction() {
        let batch = BlockBatch::new(PeerId(7), "node-7", vec![]);
        assert_eq!(batch.peer, PeerId(7));
        assert_eq!(batch.display_id, "node-7");
        assert!(batch.blocks.is_empty());
    }
}
