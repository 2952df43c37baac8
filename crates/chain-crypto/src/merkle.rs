// chain-crypto/src/merkle.rs

use crate::{hash::Hashable, CryptoError, CryptoResult, Hash};
use serde::{Deserialize, Serialize};

/// Merkle tree over a list of leaf hashes
///
/// Leaves are padded with zero hashes up to the next power of two, so every
/// node has a sibling and proofs have a fixed length per tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleTree {
    /// Node hashes per level; `levels[0]` holds the padded leaves
    levels: Vec<Vec<Hash>>,
    /// Number of real (unpadded) leaves
    leaf_count: usize,
}

impl MerkleTree {
    /// Build a tree from precomputed leaf hashes
    pub fn from_hashes(leaf_hashes: &[Hash]) -> CryptoResult<Self> {
        if leaf_hashes.is_empty() {
            return Err(CryptoError::MerkleError("Cannot create empty tree".into()));
        }

        let leaf_count = leaf_hashes.len();
        let mut current = leaf_hashes.to_vec();
        current.resize(leaf_count.next_power_of_two(), Hash::zero());

        let mut levels = Vec::new();
        while current.len() > 1 {
            let next: Vec<Hash> = current
                .chunks(2)
                .map(|pair| combine_hashes(pair[0], pair[1]))
                .collect();
            levels.push(std::mem::replace(&mut current, next));
        }
        levels.push(current);

        Ok(Self { levels, leaf_count })
    }

    /// Build a tree by hashing raw leaf data
    pub fn new<T: AsRef<[u8]>>(leaves: &[T]) -> CryptoResult<Self> {
        let hashes: Vec<Hash> = leaves.iter().map(|leaf| leaf.as_ref().hash()).collect();
        Self::from_hashes(&hashes)
    }

    /// Get the root hash of the tree
    pub fn root(&self) -> Hash {
        self.levels[self.levels.len() - 1][0]
    }

    /// Get the number of leaves
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Generate a Merkle proof for a specific leaf
    pub fn proof(&self, index: usize) -> CryptoResult<MerkleProof> {
        if index >= self.leaf_count {
            return Err(CryptoError::MerkleError("Index out of bounds".into()));
        }

        let mut proof_hashes = Vec::new();
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            proof_hashes.push(level[position ^ 1]);
            position /= 2;
        }

        Ok(MerkleProof {
            leaf_index: index,
            leaf_hash: self.levels[0][index],
            proof_hashes,
        })
    }

    /// Verify a Merkle proof against a root and the claimed leaf hash
    pub fn verify_proof(root: Hash, proof: &MerkleProof, leaf_hash: Hash) -> bool {
        if leaf_hash != proof.leaf_hash {
            return false;
        }

        let mut current = leaf_hash;
        let mut position = proof.leaf_index;

        for proof_hash in &proof.proof_hashes {
            current = if position % 2 == 0 {
                combine_hashes(current, *proof_hash)
            } else {
                combine_hashes(*proof_hash, current)
            };
            position /= 2;
        }

        current == root
    }
}

fn combine_hashes(left: Hash, right: Hash) -> Hash {
    let mut combined = Vec::with_capacity(64);
    combined.extend_from_slice(left.as_bytes());
    combined.extend_from_slice(right.as_bytes());
    combined.hash()
}

/// Merkle proof for verifying a leaf is in the tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleProof {
    leaf_index: usize,
    leaf_hash: Hash,
    proof_hashes: Vec<Hash>,
}

impl MerkleProof {
    pub fn leaf_index(&self) -> usize {
        self.leaf_index
    }

    pub fn leaf_hash(&self) -> Hash {
        self.leaf_hash
    }

    pub fn proof_hashes(&self) -> &[Hash] {
        &self.proof_hashes
    }

    pub fn verify(&self, root: Hash, leaf_hash: Hash) -> bool {
        MerkleTree::verify_proof(root, self, leaf_hash)
    }
}
