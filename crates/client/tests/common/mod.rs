use onekey_client::{RecordingClock, RepositoryClient, RetryPolicy};
use onekey_core::config::{ClientConfig, RepositoryConfig};
use onekey_core::{AppId, ContentHash, DepotId, ManifestEntry, ManifestId};
use serde_json::{Value, json};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

pub fn repo(name: &str, mirrors: &[String], token: Option<&str>) -> RepositoryConfig {
    RepositoryConfig {
        name: name.to_string(),
        mirrors: mirrors.to_vec(),
        token: token.map(str::to_string),
    }
}

pub fn policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(2),
        jitter: false,
    }
}

/// A client whose backoff is recorded instead of slept.
pub fn client(
    repo: &RepositoryConfig,
    max_retries: u32,
) -> (RepositoryClient, Arc<RecordingClock>) {
    let clock = Arc::new(RecordingClock::new());
    let client = RepositoryClient::new(repo, &ClientConfig::default())
        .unwrap()
        .with_clock(clock.clone())
        .with_retry_policy(policy(max_retries));
    (client, clock)
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

pub fn index_json(updated_at: &str, entries: &[ManifestEntry]) -> Value {
    json!({
        "app_id": 440,
        "updated_at": updated_at,
        "entries": entries,
    })
}
