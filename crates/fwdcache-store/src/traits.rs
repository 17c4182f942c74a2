//! Core trait for opaque byte storage.

use bytes::Bytes;

use crate::error::StoreError;

/// Minimal key/value contract for storing opaque byte blobs.
///
/// All implementations must be `Send + Sync` for use across async tasks.
/// Values are passed as [`Bytes`] so a stored response can be handed back
/// without copying.
#[async_trait::async_trait]
pub trait ByteCache: Send + Sync {
    /// Retrieve the value stored under `key`. Returns `None` if not found.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Store `value` under `key`, overwriting any previous value.
    async fn set(&self, key: &str, value: Bytes) -> Result<(), StoreError>;

    /// Delete the value stored under `key`. Deleting a missing key is a no-op.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
