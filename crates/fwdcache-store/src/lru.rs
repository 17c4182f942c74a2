//! Byte-budgeted LRU eviction layer over another [`ByteCache`].
//!
//! The layer keeps only an index of keys and value sizes, ordered from most
//! to least recently used; values live in the wrapped store. When a `set`
//! pushes the tracked total above the capacity, least recently used keys are
//! evicted from the index and then deleted from the wrapped store.
//!
//! The index lock only ever covers bookkeeping. Every call into the wrapped
//! store happens after the lock is released, so a slow backend (disk, remote
//! cache) never blocks other callers on the index.
//!
//! A `get` checks the index, releases the lock, then reads the wrapped
//! store. That read is not ordered with a concurrent eviction of the same
//! key, so it may miss even though the index held the key a moment earlier.
//! Callers treat a miss as a cache miss, which is always safe.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use lru::LruCache;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::traits::ByteCache;

/// LRU index: key -> tracked value size, plus the running total.
struct LruIndex {
    entries: LruCache<String, u64>,
    used_bytes: u64,
}

impl LruIndex {
    fn remove(&mut self, key: &str) -> bool {
        match self.entries.pop(key) {
            Some(size) => {
                self.used_bytes -= size;
                true
            }
            None => false,
        }
    }
}

/// Thread-safe, byte-bounded LRU cache over any [`ByteCache`].
///
/// The sum of tracked sizes never exceeds `capacity`, with one exception: a
/// single value larger than the capacity is kept on its own. The eviction
/// loop never removes the last remaining entry, so inserting an oversized
/// value always succeeds instead of thrashing.
pub struct LruStore {
    inner: Arc<dyn ByteCache>,
    capacity: u64,
    index: Mutex<LruIndex>,
}

impl LruStore {
    /// Wrap `inner` with an LRU layer of `capacity` bytes.
    pub fn new(inner: Arc<dyn ByteCache>, capacity: u64) -> Self {
        Self {
            inner,
            capacity,
            index: Mutex::new(LruIndex {
                entries: LruCache::unbounded(),
                used_bytes: 0,
            }),
        }
    }

    /// Configured capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Sum of the tracked sizes of all indexed values.
    pub fn used_bytes(&self) -> u64 {
        self.index.lock().expect("lru lock poisoned").used_bytes
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.index.lock().expect("lru lock poisoned").entries.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Indexed keys from most to least recently used.
    pub fn keys(&self) -> Vec<String> {
        self.index
            .lock()
            .expect("lru lock poisoned")
            .entries
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Record `key` with `size` as most recently used and pick eviction victims.
    fn track(&self, key: &str, size: u64) -> Vec<String> {
        let mut index = self.index.lock().expect("lru lock poisoned");

        // `get_mut` also promotes an existing entry to most recently used.
        if let Some(tracked) = index.entries.get_mut(key) {
            let old = std::mem::replace(tracked, size);
            index.used_bytes = index.used_bytes - old + size;
        } else {
            index.entries.put(key.to_string(), size);
            index.used_bytes += size;
        }

        let mut victims = Vec::new();
        while index.used_bytes > self.capacity && index.entries.len() > 1 {
            let Some((victim, victim_size)) = index.entries.pop_lru() else {
                break;
            };
            index.used_bytes -= victim_size;
            victims.push(victim);
        }

        victims
    }
}

#[async_trait::async_trait]
impl ByteCache for LruStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let indexed = {
            let mut index = self.index.lock().expect("lru lock poisoned");
            index.entries.get(key).is_some()
        };
        if !indexed {
            return Ok(None);
        }

        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        let victims = self.track(key, value.len() as u64);

        if !victims.is_empty() {
            debug!(key, evicted = victims.len(), "lru eviction");
        }
        for victim in &victims {
            if let Err(e) = self.inner.delete(victim).await {
                warn!(key = %victim, %e, "failed to delete evicted value");
            }
        }

        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        {
            let mut index = self.index.lock().expect("lru lock poisoned");
            index.remove(key);
        }

        self.inner.delete(key).await
    }
}
