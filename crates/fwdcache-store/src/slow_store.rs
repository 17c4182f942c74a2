//! A [`ByteCache`] wrapper that adds configurable random IO latency.
//!
//! `SlowStore` wraps any `Arc<dyn ByteCache>` and sleeps for a random
//! duration before each read or write operation. The RNG is seeded for
//! deterministic, reproducible behaviour across test runs.
//!
//! # Example
//!
//! ```ignore
//! let slow = SlowStore::new(inner)
//!     .read_latency(5, 20)    // 5–20 ms per read
//!     .write_latency(10, 30)  // 10–30 ms per write
//!     .seed(42);
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::StoreError;
use crate::traits::ByteCache;

/// A [`ByteCache`] wrapper that injects random latency before IO operations.
///
/// Used to check that callers never hold a lock across storage I/O: with a
/// slow backend, such a lock would serialize every concurrent request.
pub struct SlowStore {
    inner: Arc<dyn ByteCache>,
    read_latency_ms: (u64, u64),
    write_latency_ms: (u64, u64),
    rng: Mutex<StdRng>,
}

impl SlowStore {
    /// Wrap an existing store with zero latency (pass-through) by default.
    pub fn new(inner: Arc<dyn ByteCache>) -> Self {
        Self {
            inner,
            read_latency_ms: (0, 0),
            write_latency_ms: (0, 0),
            rng: Mutex::new(StdRng::seed_from_u64(0)),
        }
    }

    /// Set the read latency range in milliseconds (uniform random).
    pub fn read_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.read_latency_ms = (min_ms, max_ms);
        self
    }

    /// Set the write latency range in milliseconds (uniform random).
    ///
    /// Applies to both `set` and `delete`.
    pub fn write_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.write_latency_ms = (min_ms, max_ms);
        self
    }

    /// Reseed the latency RNG.
    pub fn seed(self, seed: u64) -> Self {
        *self.rng.lock().expect("rng lock poisoned") = StdRng::seed_from_u64(seed);
        self
    }

    async fn delay(&self, (min_ms, max_ms): (u64, u64)) {
        if max_ms == 0 {
            return;
        }
        let ms = {
            let mut rng = self.rng.lock().expect("rng lock poisoned");
            rng.random_range(min_ms..=max_ms.max(min_ms))
        };
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[async_trait::async_trait]
impl ByteCache for SlowStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.delay(self.read_latency_ms).await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        self.delay(self.write_latency_ms).await;
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.delay(self.write_latency_ms).await;
        self.inner.delete(key).await
    }
}
