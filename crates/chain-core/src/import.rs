// chain-core/src/import.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of handing one block to the chain
///
/// Produced by the chain when asked to connect a block; the sync layer keys
/// all of its per-peer mode decisions off this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportResult {
    /// Stored and became the new canonical head
    ImportedBest,
    /// Stored on a side branch
    ImportedNotBest,
    /// Already known
    Exist,
    /// Parent unknown, cannot be connected yet
    NoParent,
}

impl ImportResult {
    /// The block ended up in storage (freshly or previously)
    pub fn is_stored(&self) -> bool {
        matches!(
            self,
            ImportResult::ImportedBest | ImportResult::ImportedNotBest | ImportResult::Exist
        )
    }

    /// The block became the new canonical head
    pub fn is_best(&self) -> bool {
        matches!(self, ImportResult::ImportedBest)
    }
}

impl fmt::Display for ImportResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImportResult::ImportedBest => "IMPORTED_BEST",
            ImportResult::ImportedNotBest => "IMPORTED_NOT_BEST",
            ImportResult::Exist => "EXIST",
            ImportResult::NoParent => "NO_PARENT",
        })
    }
}
