//! Byte store trait and backend implementations.
//!
//! This crate defines the [`ByteCache`] trait, the minimal key/value contract
//! the HTTP cache persists serialized responses through, along with:
//!
//! - [`MemoryStore`] — in-memory storage backed by a `RwLock<HashMap>`.
//! - [`FileStore`] — one file per key with a 2-level fan-out directory layout.
//! - [`LruStore`] — a byte-budgeted LRU eviction layer over any other store.
//! - [`SlowStore`] — a latency-injecting wrapper for tests.

mod error;
mod file_store;
mod lru;
mod memory_store;
mod slow_store;
mod traits;

pub use error::StoreError;
pub use file_store::FileStore;
pub use lru::LruStore;
pub use memory_store::MemoryStore;
pub use slow_store::SlowStore;
pub use traits::ByteCache;
