//! Choosing between several configured repositories.

use crate::backoff::{Clock, RetryPolicy};
use crate::error::{FetchError, FetchResult};
use crate::repository::{RateLimitStatus, RepositoryClient};
use futures::future::join_all;
use onekey_core::config::ClientConfig;
use onekey_core::{AppId, RepositoryIndex};
use std::sync::Arc;

/// The repository chosen for an app together with the index it served.
#[derive(Debug, Clone)]
pub struct Selected {
    pub client: Arc<RepositoryClient>,
    pub index: Arc<RepositoryIndex>,
}

/// All configured repositories, in configuration order.
#[derive(Debug, Clone)]
pub struct RepositorySet {
    clients: Vec<Arc<RepositoryClient>>,
}

impl RepositorySet {
    pub fn new(clients: Vec<RepositoryClient>) -> Self {
        Self {
            clients: clients.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> FetchResult<Self> {
        Self::from_config_with(config, None, None)
    }

    /// Like [`from_config`](Self::from_config) with an optional clock and retry policy override.
    pub fn from_config_with(
        config: &ClientConfig,
        clock: Option<Arc<dyn Clock>>,
        policy: Option<RetryPolicy>,
    ) -> FetchResult<Self> {
        let mut clients = Vec::with_capacity(config.repositories.len());
        for repo in &config.repositories {
            let mut client = RepositoryClient::new(repo, config)?;
            if let Some(clock) = &clock {
                client = client.with_clock(clock.clone());
            }
            if let Some(policy) = &policy {
                client = client.with_retry_policy(policy.clone());
            }
            clients.push(client);
        }
        Ok(Self::new(clients))
    }

    pub fn clients(&self) -> &[Arc<RepositoryClient>] {
        &self.clients
    }

    /// Ask every repository for `app`'s index and keep the most recently updated.
    ///
    /// Ties go to the repository configured first. When no repository
    /// answers, the first error other than NotFound is returned, or NotFound
    /// if every repository reported NotFound.
    pub async fn select_latest(&self, app: AppId) -> FetchResult<Selected> {
        let results = join_all(self.clients.iter().map(|c| c.fetch_index(app))).await;

        let mut best: Option<Selected> = None;
        let mut first_error: Option<FetchError> = None;
        for (client, result) in self.clients.iter().zip(results) {
            match result {
                Ok(index) => {
                    let newer = best
                        .as_ref()
                        .is_none_or(|b| index.updated_at > b.index.updated_at);
                    if newer {
                        best = Some(Selected {
                            client: client.clone(),
                            index: Arc::new(index),
                        });
                    }
                }
                Err(FetchError::NotFound(_)) => {
                    tracing::debug!(repository = client.name(), %app, "App not in repository");
                }
                Err(e) => {
                    tracing::warn!(repository = client.name(), %app, error = %e, "Index request failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(selected) = best {
            tracing::info!(
                repository = selected.client.name(),
                %app,
                updated_at = %selected.index.updated_at,
                "Selected repository"
            );
            return Ok(selected);
        }
        Err(first_error.unwrap_or_else(|| FetchError::NotFound(format!("app {app} in any repository"))))
    }

    /// Rate-limit status of every repository.
    pub async fn rate_limits(&self) -> Vec<(String, FetchResult<RateLimitStatus>)> {
        let results = join_all(self.clients.iter().map(|c| c.rate_limit())).await;
        self.clients
            .iter()
            .map(|c| c.name().to_string())
            .zip(results)
            .collect()
    }
}
