// chain-core/src/block.rs
use crate::{transaction::Transaction, types::*, CoreError, CoreResult};
use chain_crypto::{hash::Hashable, Hash, HashAlgorithm, MerkleTree};
use serde::{Deserialize, Serialize};

/// Block header containing metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block number/height
    pub number: BlockNumber,
    /// Hash of previous block
    pub parent_hash: Hash,
    /// Merkle root of transactions
    pub transactions_root: Hash,
    /// Block timestamp
    pub timestamp: Timestamp,
    /// Extra data (miner tag, protocol hints, etc.)
    pub extra_data: Vec<u8>,
}

impl BlockHeader {
    /// Calculate header hash
    pub fn hash(&self) -> Hash {
        let bytes = bincode::serialize(self).unwrap();
        bytes.hash_with(HashAlgorithm::Blake3)
    }

    /// Validate header basic properties
    pub fn validate(&self, parent: &BlockHeader) -> CoreResult<()> {
        // Check block number is sequential
        if self.number != parent.number + 1 {
            return Err(CoreError::InvalidBlock(
                format!("Invalid block number: expected {}, got {}",
                    parent.number + 1, self.number)
            ));
        }

        // Check parent hash matches
        if self.parent_hash != parent.hash() {
            return Err(CoreError::InvalidBlock(
                "Parent hash mismatch".into()
            ));
        }

        // Check timestamp is after parent
        if self.timestamp <= parent.timestamp {
            return Err(CoreError::InvalidBlock(
                "Block timestamp must be after parent".into()
            ));
        }

        Ok(())
    }
}

/// Complete block structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block header
    pub header: BlockHeader,
    /// List of transactions
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Create a new block
    pub fn new(
        number: BlockNumber,
        parent_hash: Hash,
        transactions: Vec<Transaction>,
    ) -> CoreResult<Self> {
        // Calculate transactions root
        let tx_hashes: Vec<Hash> = transactions.iter().map(|tx| tx.hash()).collect();
        let transactions_root = if tx_hashes.is_empty() {
            Hash::zero()
        } else {
            MerkleTree::from_hashes(&tx_hashes)?.root()
        };

        let header = BlockHeader {
            number,
            parent_hash,
            transactions_root,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_secs(),
            extra_data: Vec::new(),
        };

        Ok(Self {
            header,
            transactions,
        })
    }

    /// Get block hash
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Get block number
    pub fn number(&self) -> BlockNumber {
        self.header.number
    }

    /// Get the parent block hash
    pub fn parent_hash(&self) -> Hash {
        self.header.parent_hash
    }

    /// Validate block structure and content
    pub fn validate(&self, parent: &Block) -> CoreResult<()> {
        // Validate header
        self.header.validate(&parent.header)?;

        // Verify transactions merkle root
        let tx_hashes: Vec<Hash> = self.transactions.iter().map(|tx| tx.hash()).collect();
        if !tx_hashes.is_empty() {
            let computed_root = MerkleTree::from_hashes(&tx_hashes)?.root();
            if computed_root != self.header.transactions_root {
                return Err(CoreError::InvalidBlock(
                    "Transactions merkle root mismatch".into()
                ));
            }
        }

        Ok(())
    }

    /// Create genesis block
    pub fn genesis() -> Self {
        let header = BlockHeader {
            number: 0,
            parent_hash: Hash::zero(),
            transactions_root: Hash::zero(),
            timestamp: 0,
            extra_data: b"Genesis Block".to_vec(),
        };

        Self {
            header,
            transactions: Vec::new(),
        }
    }

    /// Check if this is the genesis block
    pub fn is_genesis(&self) -> bool {
        self.header.number == 0 && self.header.parent_hash == Hash::zero()
    }
}
