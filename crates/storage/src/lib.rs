//! Local storage for verified Onekey manifests.
//!
//! This crate provides:
//! - An object-store trait with atomic puts
//! - A filesystem backend writing through a staging directory
//! - The manifest store: revision-aware commits, reads and audits

pub mod backends;
pub mod error;
pub mod store;
pub mod traits;

pub use backends::filesystem::{FilesystemBackend, STAGING_DIR};
pub use error::{StorageError, StorageResult};
pub use store::{AuditIssue, AuditReport, ManifestStore, StoreOutcome, payload_key, record_key};
pub use traits::ObjectStore;

use onekey_core::config::StoreConfig;
use std::sync::Arc;

async fn backend_from_config(config: &StoreConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    if config.path.as_os_str().is_empty() {
        return Err(StorageError::Config("store path must not be empty".to_string()));
    }
    Ok(Arc::new(FilesystemBackend::new(&config.path).await?))
}

/// Open a manifest store from configuration.
pub async fn from_config(config: &StoreConfig) -> StorageResult<ManifestStore> {
    ManifestStore::open(backend_from_config(config).await?).await
}

/// Open a manifest store for reading; staging files are left in place.
pub async fn from_config_read_only(config: &StoreConfig) -> StorageResult<ManifestStore> {
    ManifestStore::open_read_only(backend_from_config(config).await?).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_filesystem_ok() {
        let temp = tempdir().unwrap();
        let config = StoreConfig {
            path: temp.path().join("depotcache"),
        };

        let store = from_config(&config).await.unwrap();
        assert!(store.records().await.unwrap().is_empty());
        assert!(temp.path().join("depotcache").join(STAGING_DIR).is_dir());
    }

    #[tokio::test]
    async fn read_only_open_keeps_staging_files() {
        let temp = tempdir().unwrap();
        let config = StoreConfig {
            path: temp.path().to_path_buf(),
        };
        from_config(&config).await.unwrap();
        let in_progress = temp.path().join(STAGING_DIR).join("writer.tmp");
        std::fs::write(&in_progress, b"half written").unwrap();

        let store = from_config_read_only(&config).await.unwrap();
        assert!(store.records().await.unwrap().is_empty());
        assert!(in_progress.exists());

        from_config(&config).await.unwrap();
        assert!(!in_progress.exists());
    }

    #[tokio::test]
    async fn from_config_rejects_empty_path() {
        let config = StoreConfig {
            path: PathBuf::new(),
        };

        match from_config(&config).await {
            Ok(_) => panic!("expected error"),
            Err(StorageError::Config(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
}
