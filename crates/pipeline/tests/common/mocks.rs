use async_trait::async_trait;
use bytes::Bytes;
use onekey_storage::ObjectStore;
use onekey_storage::error::{StorageError, StorageResult};

/// Empty store whose writes panic, taking down the worker that commits.
pub struct PanickingBackend;

#[async_trait]
impl ObjectStore for PanickingBackend {
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        Err(StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, _data: Bytes) -> StorageResult<()> {
        panic!("write to {key} crashed");
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        Err(StorageError::NotFound(key.to_string()))
    }

    async fn list(&self, _prefix: &str) -> StorageResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn clean_staging(&self) -> StorageResult<usize> {
        Ok(0)
    }

    fn backend_name(&self) -> &'static str {
        "panicking"
    }
}
