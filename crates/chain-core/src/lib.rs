// chain-core/src/lib.rs

//! Core chain data structures
//!
//! This crate provides:
//! - Block and block header structures
//! - Transaction type
//! - The outcome of handing a block to the chain (`ImportResult`)
//! - Basic header linkage validation

pub mod block;
pub mod import;
pub mod transaction;
pub mod types;

pub use block::{Block, BlockHeader};
pub use import::ImportResult;
pub use transaction::Transaction;
pub use types::*;

/// Result type for chain data operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while building or validating chain data
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    #[error("Cryptographic error: {0}")]
    CryptoError(#[from] chain_crypto::CryptoError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_imports() {
        // Smoke test to ensure all modules compile together
        let genesis = Block::genesis();
        assert!(genesis.is_genesis());
        assert!(ImportResult::Exist.is_stored());
    }
}
