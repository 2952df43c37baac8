// chain-crypto/src/lib.rs

//! Cryptographic primitives for the chain data model
//!
//! This crate provides:
//! - Hashing functions (SHA256, SHA3, Blake3)
//! - The 32-byte `Hash` block/transaction identifier
//! - Merkle tree implementation

pub mod hash;
pub mod merkle;

pub use hash::{Hash, HashAlgorithm, Hashable};
pub use merkle::{MerkleProof, MerkleTree};

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid hash")]
    InvalidHash,

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Merkle tree error: {0}")]
    MerkleError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_basics() {
        // Basic smoke test
        let hash = Hash::zero();
        assert_eq!(hash.as_bytes(), &[0u8; hash::HASH_SIZE]);
        assert_eq!(Hash::from_hex(&hash.to_hex()).unwrap(), hash);
    }
}
