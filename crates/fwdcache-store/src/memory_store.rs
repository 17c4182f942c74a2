//! In-memory byte storage backend.

use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::ByteCache;

/// In-memory byte store backed by a `RwLock<HashMap>`.
///
/// Unbounded on its own; wrap it in an [`LruStore`](crate::LruStore) to cap
/// its size.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStore {
    /// Create a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }

    /// Check whether a key is stored.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().expect("lock poisoned").contains_key(key)
    }

    /// Total bytes held by stored values.
    pub fn used_bytes(&self) -> u64 {
        self.entries
            .read()
            .expect("lock poisoned")
            .values()
            .map(|v| v.len() as u64)
            .sum()
    }
}

#[async_trait::async_trait]
impl ByteCache for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        let mut map = self.entries.write().expect("lock poisoned");
        debug!(key, size = value.len(), "storing value in memory");
        map.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut map = self.entries.write().expect("lock poisoned");
        if map.remove(key).is_some() {
            debug!(key, "deleted value from memory");
        }
        Ok(())
    }
}
