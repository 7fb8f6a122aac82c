//! Bounded LRU cache of per-block delta sets.
//!
//! Both `get` and `put` refresh recency. Values are shared behind `Arc`, so a
//! hit hands out a reference-counted handle rather than a copy.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bc_data::BlockId;
use parking_lot::Mutex;
use schnellru::{ByLength, LruMap};

use crate::delta::AddressDelta;

/// Lookup counters since construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct BlockDeltaCache {
    entries: Mutex<LruMap<BlockId, Arc<AddressDelta>, ByLength>>,
    capacity: u32,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BlockDeltaCache {
    /// Creates a cache holding at most `capacity` blocks. Zero disables caching.
    pub fn new(capacity: usize) -> Self {
        let capacity = u32::try_from(capacity).unwrap_or(u32::MAX);
        Self {
            entries: Mutex::new(LruMap::new(ByLength::new(capacity))),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, block: &BlockId) -> Option<Arc<AddressDelta>> {
        let found = self.entries.lock().get(block).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Stores `delta` for `block`, evicting the least recently used entry when full.
    pub fn put(&self, block: BlockId, delta: Arc<AddressDelta>) {
        if self.capacity == 0 {
            return;
        }
        self.entries.lock().insert(block, delta);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

impl fmt::Debug for BlockDeltaCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockDeltaCache")
            .field("capacity", &self.capacity)
            .field("entries", &self.entries.try_lock().map(|map| map.len()))
            .finish()
    }
}
