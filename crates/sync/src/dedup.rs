// sync/src/dedup.rs

use chain_crypto::Hash;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, RwLock};

/// Bounded record of recently imported block hashes
///
/// Shared by all import workers to drop blocks that were already driven
/// into the chain. Insertion order is tracked so the oldest entries are
/// evicted once the capacity is reached; an evicted hash may be imported
/// again and the chain will answer `Exist` for it.
#[derive(Clone)]
pub struct ImportedCache {
    inner: Arc<RwLock<CacheInner>>,
}

struct CacheInner {
    seen: HashSet<Hash>,
    order: VecDeque<Hash>,
    capacity: usize,
}

impl ImportedCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                seen: HashSet::new(),
                order: VecDeque::new(),
                capacity: capacity.max(1),
            })),
        }
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.inner.read().unwrap().seen.contains(hash)
    }

    /// Record a hash, evicting the oldest entries when full
    ///
    /// Returns false when the hash was already present.
    pub fn insert(&self, hash: Hash) -> bool {
        let mut inner = self.inner.write().unwrap();
        if !inner.seen.insert(hash) {
            return false;
        }
        inner.order.push_back(hash);
        while inner.order.len() > inner.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.seen.remove(&oldest);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().seen.is_empty()
    }
}
