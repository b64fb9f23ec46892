//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;

/// Key-addressed object store backing the manifest store.
///
/// Keys are `/`-separated relative paths. Implementations must make `put`
/// atomic: a reader either sees the previous object or the complete new one.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Get an object's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Put an object atomically, replacing any existing object.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Delete an object.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List object keys under a prefix, sorted.
    ///
    /// Staging files are never listed.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Remove leftovers of interrupted writes. Returns how many were removed.
    async fn clean_staging(&self) -> StorageResult<usize>;

    /// Get the name of this storage backend (e.g. "filesystem").
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend accessibility.
    ///
    /// The default implementation returns Ok(()).
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
