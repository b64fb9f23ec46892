pub mod mocks;

pub use mocks::PanickingBackend;
use onekey_client::{RecordingClock, RepositorySet, RetryPolicy};
use onekey_core::config::{ClientConfig, RepositoryConfig, StoreConfig};
use onekey_core::{AppId, ContentHash, DepotId, ManifestEntry, ManifestId};
use onekey_pipeline::Pipeline;
use onekey_signer::{ManifestVerifier, TrustedKeys};
use serde_json::{Value, json};
use std::net::TcpListener;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

pub fn entry(depot: u32, manifest: u64, revision: u64, data: &[u8]) -> ManifestEntry {
    ManifestEntry {
        app_id: AppId(440),
        depot_id: DepotId(depot),
        manifest_id: ManifestId(manifest),
        revision,
        content_hash: ContentHash::compute(data),
        size: data.len() as u64,
        signature: None,
    }
}

pub fn index_json(entries: &[ManifestEntry]) -> Value {
    json!({
        "app_id": 440,
        "updated_at": "2024-05-01T12:00:00Z",
        "entries": entries,
    })
}

/// Repositories for one mock server, with recorded (instant) backoff.
pub fn repositories(base_url: String) -> RepositorySet {
    let config = config(base_url, Path::new("unused"));
    let policy = RetryPolicy {
        max_retries: 1,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(10),
        jitter: false,
    };
    RepositorySet::from_config_with(&config, Some(Arc::new(RecordingClock::new())), Some(policy))
        .unwrap()
}

fn config(base_url: String, root: &Path) -> ClientConfig {
    ClientConfig {
        store: StoreConfig {
            path: root.to_path_buf(),
        },
        repositories: vec![RepositoryConfig {
            name: "mock".to_string(),
            mirrors: vec![base_url],
            token: None,
        }],
        ..ClientConfig::default()
    }
}

/// A pipeline against one mock repository, storing under `root`.
pub async fn pipeline(base_url: String, root: &Path, verifier: ManifestVerifier) -> Pipeline {
    let store = onekey_storage::from_config(&config(base_url.clone(), root).store)
        .await
        .unwrap();
    Pipeline::new(repositories(base_url), verifier, store).with_workers(2)
}

#[allow(dead_code)]
pub fn strict_verifier(trusted: TrustedKeys) -> ManifestVerifier {
    ManifestVerifier::new(trusted, true)
}
