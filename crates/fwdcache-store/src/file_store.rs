//! File-based byte storage backend.
//!
//! Stores one file per key with a 2-level fan-out directory structure:
//! `{base_dir}/{hex[0..2]}/{hex[2..4]}/{hex}` where `hex = blake3(key)`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::ByteCache;

/// Distinguishes temp files of concurrent writers to the same key.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// File-based byte store with 2-level fan-out directory layout.
///
/// Keys are arbitrary strings (usually URLs), so file names are derived from
/// the blake3 hash of the key rather than the key itself.
///
/// Writes are atomic: data is written to a temporary file first, then
/// renamed into place. A reader never sees a half-written value.
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Create a new file store rooted at the given directory.
    ///
    /// The directory is created if it does not exist.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Return the root directory of the store.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Remove every stored value and return how many fan-out directories
    /// were removed.
    ///
    /// Only the top-level fan-out directories (two lowercase hex digits)
    /// are touched; anything else under the base directory is left alone.
    pub fn clear(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let is_fanout = name.to_str().is_some_and(|n| {
                n.len() == 2 && n.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
            });
            if is_fanout && entry.file_type()?.is_dir() {
                std::fs::remove_dir_all(entry.path())?;
                removed += 1;
            }
        }
        debug!(dir = %self.base_dir.display(), removed, "cleared file store");
        Ok(removed)
    }

    /// Compute the full file path for a key.
    fn key_path(&self, key: &str) -> PathBuf {
        let hex = blake3::hash(key.as_bytes()).to_hex();
        self.base_dir
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(hex.as_str())
    }
}

#[async_trait::async_trait]
impl ByteCache for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let path = self.key_path(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        let path = self.key_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_path = path.with_extension(format!("{seq}.tmp"));
        tokio::fs::write(&tmp_path, &value).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(e));
        }

        debug!(key, path = %path.display(), size = value.len(), "stored value to file");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.key_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key, "deleted value file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}
