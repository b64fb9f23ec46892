//! Client configuration types.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level client configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Number of concurrent fetch → verify → store workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Query each repository's rate-limit status before a run.
    #[serde(default = "default_check_rate_limit")]
    pub check_rate_limit: bool,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub verify: VerifyConfig,
    /// Repositories, in preference order for tie-breaking.
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
}

/// Local store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Output directory consumed by the downstream application.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

/// Retry and backoff settings for transient repository errors.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = single attempt).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Randomize each delay within `[delay/2, delay]`.
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

/// Signature verification settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Reject manifests that carry no signature.
    #[serde(default)]
    pub require_signatures: bool,
    /// Trusted public keys in `name:base64` format.
    #[serde(default)]
    pub trusted_keys: Vec<String>,
}

/// One remote manifest repository.
#[derive(Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub name: String,
    /// Base URLs tried in order.
    pub mirrors: Vec<String>,
    /// Bearer token sent with every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl std::fmt::Debug for RepositoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryConfig")
            .field("name", &self.name)
            .field("mirrors", &self.mirrors)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn default_workers() -> usize {
    4
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_check_rate_limit() -> bool {
    true
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./depotcache")
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            request_timeout_secs: default_request_timeout_secs(),
            check_rate_limit: default_check_rate_limit(),
            store: StoreConfig::default(),
            retry: RetryConfig::default(),
            verify: VerifyConfig::default(),
            repositories: Vec::new(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// A starter configuration written by `onekey config init`.
    pub fn example() -> Self {
        Self {
            repositories: vec![RepositoryConfig {
                name: "primary".to_string(),
                mirrors: vec!["https://manifests.example.com".to_string()],
                token: None,
            }],
            ..Self::default()
        }
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> crate::Result<()> {
        if self.workers == 0 {
            return Err(invalid("workers must be at least 1"));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(invalid("retry.initial_delay_ms must not exceed retry.max_delay_ms"));
        }
        if self.repositories.is_empty() {
            return Err(invalid("at least one repository must be configured"));
        }

        let mut names = HashSet::new();
        for repo in &self.repositories {
            if repo.name.trim().is_empty() {
                return Err(invalid("repository name must not be empty"));
            }
            if !names.insert(repo.name.as_str()) {
                return Err(invalid(&format!("duplicate repository name: {}", repo.name)));
            }
            if repo.mirrors.is_empty() {
                return Err(invalid(&format!(
                    "repository {} has no mirrors",
                    repo.name
                )));
            }
            for mirror in &repo.mirrors {
                if !mirror.starts_with("http://") && !mirror.starts_with("https://") {
                    return Err(invalid(&format!(
                        "mirror URL must start with http:// or https://: {mirror}"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> crate::Error {
    crate::Error::InvalidConfig(msg.to_string())
}
