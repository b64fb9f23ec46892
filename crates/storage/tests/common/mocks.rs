use async_trait::async_trait;
use bytes::Bytes;
use onekey_storage::error::{StorageError, StorageResult};
use onekey_storage::{FilesystemBackend, ObjectStore};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Filesystem backend that fails puts to keys under a chosen prefix,
/// standing in for a full or read-only disk.
#[allow(dead_code)]
pub struct FaultyBackend {
    inner: FilesystemBackend,
    fail_prefix: Mutex<Option<String>>,
    pub puts: AtomicUsize,
}

#[allow(dead_code)]
impl FaultyBackend {
    pub fn new(inner: FilesystemBackend) -> Self {
        Self {
            inner,
            fail_prefix: Mutex::new(None),
            puts: AtomicUsize::new(0),
        }
    }

    /// Fail every subsequent put whose key starts with `prefix`.
    pub fn fail_puts_under(&self, prefix: &str) {
        *self.fail_prefix.lock().unwrap() = Some(prefix.to_string());
    }

    pub fn heal(&self) {
        *self.fail_prefix.lock().unwrap() = None;
    }
}

#[async_trait]
impl ObjectStore for FaultyBackend {
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .fail_prefix
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|p| key.starts_with(p));
        if failing {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                "no space left on device",
            )));
        }
        self.inner.put(key, data).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }

    async fn clean_staging(&self) -> StorageResult<usize> {
        self.inner.clean_staging().await
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}
