// chain-core/src/transaction.rs

use crate::types::Timestamp;
use chain_crypto::{hash::Hashable, Hash, HashAlgorithm};
use serde::{Deserialize, Serialize};

/// A transaction carried inside a synchronized block
///
/// The sync layer never executes transactions; it only moves them around and
/// counts them, so the payload stays opaque here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Opaque encoded transaction body
    pub payload: Vec<u8>,
    /// Submission timestamp
    pub timestamp: Timestamp,
}

impl Transaction {
    pub fn new(payload: Vec<u8>, timestamp: Timestamp) -> Self {
        Self { payload, timestamp }
    }

    /// Calculate transaction hash
    pub fn hash(&self) -> Hash {
        let bytes = bincode::serialize(self).unwrap();
        bytes.hash_with(HashAlgorithm::Blake3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_hash_deterministic() {
        let tx = Transaction::new(b"transfer".to_vec(), 42);
        assert_eq!(tx.hash(), tx.hash());
    }

    #[test]
    fn test_transaction_hash_differs_by_payload() {
        let a = Transaction::new(b"a".to_vec(), 1);
        let b = Transaction::new(b"b".to_vec(), 1);
        assert_ne!(a.hash(), b.hash());
    }
}
