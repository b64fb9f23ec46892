//! HTTP client for one manifest repository.
//!
//! Endpoints, relative to each mirror base URL:
//!
//! - `GET v1/apps/{app}/index.json` → [`RepositoryIndex`]
//! - `GET v1/manifests/{app}/{depot}/{manifest}` → raw manifest bytes
//! - `GET v1/rate_limit` → [`RateLimitStatus`]

use crate::backoff::{Clock, RetryPolicy, SystemClock};
use crate::coalesce::Coalescer;
use crate::error::{FetchError, FetchResult};
use bytes::Bytes;
use onekey_core::config::{ClientConfig, RepositoryConfig};
use onekey_core::{AppId, MAX_MANIFEST_SIZE, ManifestEntry, ManifestKey, RepositoryIndex};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::instrument;

/// How long a rate-limit answer is reused.
pub const RATE_LIMIT_CACHE_TTL: Duration = Duration::from_secs(60);

/// A repository's request quota.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub limit: u64,
    pub remaining: u64,
    /// Unix timestamp at which the quota resets.
    pub reset: i64,
}

impl RateLimitStatus {
    pub fn reset_at(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp(self.reset).ok()
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Client for one configured repository.
pub struct RepositoryClient {
    name: String,
    mirrors: Vec<String>,
    token: Option<String>,
    http: reqwest::Client,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    manifests: Coalescer<ManifestKey, Bytes>,
    rate_limit: Mutex<Option<(Instant, RateLimitStatus)>>,
}

impl std::fmt::Debug for RepositoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryClient")
            .field("name", &self.name)
            .field("mirrors", &self.mirrors)
            .finish_non_exhaustive()
    }
}

impl RepositoryClient {
    /// Build a client for `repo` using the timeout and retry settings of `config`.
    pub fn new(repo: &RepositoryConfig, config: &ClientConfig) -> FetchResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("onekey/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Protocol(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            name: repo.name.clone(),
            mirrors: repo
                .mirrors
                .iter()
                .map(|m| m.trim_end_matches('/').to_string())
                .collect(),
            token: repo.token.clone(),
            http,
            policy: RetryPolicy::from(&config.retry),
            clock: Arc::new(SystemClock),
            manifests: Coalescer::new(),
            rate_limit: Mutex::new(None),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mirrors(&self) -> &[String] {
        &self.mirrors
    }

    /// Fetch and validate the index of `app`.
    #[instrument(skip(self), fields(repository = %self.name))]
    pub async fn fetch_index(&self, app: AppId) -> FetchResult<RepositoryIndex> {
        let path = format!("v1/apps/{app}/index.json");
        let path = path.as_str();
        let body = self
            .policy
            .retry(self.clock.as_ref(), path, move || self.get_from_mirrors(path))
            .await?;

        let index: RepositoryIndex = serde_json::from_slice(&body)
            .map_err(|e| FetchError::Protocol(format!("malformed index for app {app}: {e}")))?;
        if index.app_id != app {
            return Err(FetchError::Protocol(format!(
                "index for app {app} describes app {}",
                index.app_id
            )));
        }
        index
            .validate()
            .map_err(|e| FetchError::Protocol(e.to_string()))?;

        tracing::debug!(entries = index.entries.len(), updated_at = %index.updated_at, "Fetched index");
        Ok(index)
    }

    /// Download the manifest bytes for `entry`.
    ///
    /// Concurrent calls for the same manifest share a single request.
    #[instrument(skip(self, entry), fields(repository = %self.name, manifest = %entry.key()))]
    pub async fn fetch_manifest(&self, entry: &ManifestEntry) -> FetchResult<Bytes> {
        if entry.size > MAX_MANIFEST_SIZE {
            return Err(FetchError::Protocol(format!(
                "manifest size {} exceeds limit of {MAX_MANIFEST_SIZE} bytes",
                entry.size
            )));
        }

        let key = entry.key();
        let path = format!(
            "v1/manifests/{}/{}/{}",
            key.app_id, key.depot_id, key.manifest_id
        );
        let path = path.as_str();
        self.manifests
            .run(key, move || {
                self.policy
                    .retry(self.clock.as_ref(), path, move || self.get_from_mirrors(path))
            })
            .await
    }

    /// Query the repository's rate-limit status, reusing answers younger than a minute.
    #[instrument(skip(self), fields(repository = %self.name))]
    pub async fn rate_limit(&self) -> FetchResult<RateLimitStatus> {
        let mut cache = self.rate_limit.lock().await;
        if let Some((fetched_at, status)) = *cache
            && fetched_at.elapsed() < RATE_LIMIT_CACHE_TTL
        {
            return Ok(status);
        }

        let body = self
            .policy
            .retry(self.clock.as_ref(), "v1/rate_limit", move || {
                self.get_from_mirrors("v1/rate_limit")
            })
            .await?;
        let status: RateLimitStatus = serde_json::from_slice(&body)
            .map_err(|e| FetchError::Protocol(format!("malformed rate limit status: {e}")))?;

        if status.is_exhausted() {
            tracing::warn!(
                limit = status.limit,
                reset_at = ?status.reset_at(),
                "Repository request quota exhausted"
            );
        } else {
            tracing::info!(limit = status.limit, remaining = status.remaining, "Repository quota");
        }

        *cache = Some((Instant::now(), status));
        Ok(status)
    }

    /// One attempt: walk the mirrors in order.
    ///
    /// NotFound moves on to the next mirror. Authentication and protocol
    /// failures stop the walk. A transient failure on any mirror makes the
    /// whole attempt transient unless a later mirror succeeds.
    async fn get_from_mirrors(&self, path: &str) -> FetchResult<Bytes> {
        let mut transient: Option<FetchError> = None;

        for mirror in &self.mirrors {
            let url = format!("{mirror}/{path}");
            match self.get_once(&url).await {
                Ok(body) => return Ok(body),
                Err(FetchError::NotFound(_)) => {
                    tracing::debug!(%url, "Not found on mirror");
                }
                Err(e) if e.is_transient() => {
                    tracing::debug!(%url, error = %e, "Mirror failed");
                    if transient.is_none() {
                        transient = Some(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(transient.unwrap_or_else(|| FetchError::NotFound(format!("{} ({path})", self.name))))
    }

    async fn get_once(&self, url: &str) -> FetchResult<Bytes> {
        let mut request = self.http.get(url);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request.send().await?;
        let status = response.status();
        match status {
            s if s.is_success() => {
                if let Some(len) = response.content_length()
                    && len > MAX_MANIFEST_SIZE
                {
                    return Err(FetchError::Protocol(format!(
                        "response of {len} bytes exceeds limit"
                    )));
                }
                Ok(response.bytes().await?)
            }
            StatusCode::NOT_FOUND => Err(FetchError::NotFound(url.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(FetchError::AuthRequired(
                format!("{} answered {status}", self.name),
            )),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(FetchError::RateLimited { retry_after })
            }
            s if s.is_server_error() => Err(FetchError::Network(format!("server error {s}"))),
            s => Err(FetchError::Protocol(format!("unexpected status {s} from {url}"))),
        }
    }
}
