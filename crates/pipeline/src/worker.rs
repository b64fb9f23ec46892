//! The fetch → verify → store worker pool.
//!
//! Jobs (one per requested identifier) are queued on a channel shared by a
//! fixed number of worker tasks. Cancelling the run token stops workers from
//! taking new jobs; a job already running finishes the depot it is on.

use crate::error::{PipelineError, PipelineResult};
use crate::report::{Outcome, RunReport};
use dashmap::DashMap;
use onekey_client::{FetchResult, RepositorySet, Selected};
use onekey_core::config::ClientConfig;
use onekey_core::{AppId, Identifier, ManifestEntry};
use onekey_signer::{ManifestVerifier, TrustedKeys};
use onekey_storage::{ManifestStore, StoreOutcome};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 4;

struct Inner {
    repositories: RepositorySet,
    verifier: ManifestVerifier,
    store: ManifestStore,
}

/// Runs requested identifiers through fetch, verification and storage.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
    workers: usize,
    check_rate_limit: bool,
}

type IndexCache = DashMap<AppId, Arc<OnceCell<FetchResult<Selected>>>>;

impl Pipeline {
    pub fn new(repositories: RepositorySet, verifier: ManifestVerifier, store: ManifestStore) -> Self {
        Self {
            inner: Arc::new(Inner {
                repositories,
                verifier,
                store,
            }),
            workers: DEFAULT_WORKERS,
            check_rate_limit: false,
        }
    }

    /// Build a pipeline from configuration, opening the configured store.
    pub async fn from_config(config: &ClientConfig) -> PipelineResult<Self> {
        config.validate()?;
        let repositories = RepositorySet::from_config(config)?;
        let trusted = TrustedKeys::parse_all(&config.verify.trusted_keys)?;
        let verifier = ManifestVerifier::new(trusted, config.verify.require_signatures);
        let store = onekey_storage::from_config(&config.store).await?;

        Ok(Self::new(repositories, verifier, store)
            .with_workers(config.workers)
            .with_rate_limit_check(config.check_rate_limit))
    }

    /// Set the pool size (at least one worker).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_rate_limit_check(mut self, enabled: bool) -> Self {
        self.check_rate_limit = enabled;
        self
    }

    pub fn store(&self) -> &ManifestStore {
        &self.inner.store
    }

    pub fn repositories(&self) -> &RepositorySet {
        &self.inner.repositories
    }

    /// Process every identifier and report what happened to each depot.
    ///
    /// Failures are recorded per identifier or depot and never abort the
    /// rest of the batch.
    pub async fn run(&self, requests: Vec<Identifier>, cancel: CancellationToken) -> RunReport {
        if self.check_rate_limit && !cancel.is_cancelled() {
            self.log_rate_limits().await;
        }

        let (tx, rx) = mpsc::channel(requests.len().max(1));
        for id in requests {
            // Capacity covers every request, so this never waits
            if tx.send(id).await.is_err() {
                break;
            }
        }
        drop(tx);
        let rx = Arc::new(Mutex::new(rx));

        let index_cache: Arc<IndexCache> = Arc::new(DashMap::new());
        // Job each worker is on; a worker that dies leaves its entry behind
        let in_flight: Arc<DashMap<usize, Identifier>> = Arc::new(DashMap::new());
        let shared = Arc::new(Mutex::new(RunReport::default()));
        let mut workers = JoinSet::new();
        for worker_id in 0..self.workers {
            let inner = self.inner.clone();
            let rx = rx.clone();
            let cancel = cancel.clone();
            let index_cache = index_cache.clone();
            let in_flight = in_flight.clone();
            let shared = shared.clone();
            workers.spawn(
                async move {
                    loop {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let next = {
                            let mut rx = rx.lock().await;
                            tokio::select! {
                                biased;
                                _ = cancel.cancelled() => None,
                                id = rx.recv() => id,
                            }
                        };
                        let Some(id) = next else { break };
                        in_flight.insert(worker_id, id);
                        let mut items = RunReport::default();
                        inner.process(id, &index_cache, &cancel, &mut items).await;
                        shared.lock().await.items.extend(items.items);
                        in_flight.remove(&worker_id);
                    }
                }
                .instrument(info_span!("worker", id = worker_id)),
            );
        }

        let mut failures = Vec::new();
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Worker task failed");
                failures.push(e.to_string());
            }
        }

        let mut report = std::mem::take(&mut *shared.lock().await);
        if !failures.is_empty() {
            let detail = failures.join("; ");
            let mut abandoned: Vec<Identifier> = in_flight.iter().map(|slot| *slot.value()).collect();
            abandoned.sort();
            for id in abandoned {
                let error = PipelineError::WorkerFailed(detail.clone());
                report.push(id.to_string(), Outcome::failed(&error));
            }
        }

        // Anything still queued was never dispatched
        let mut rx = rx.lock().await;
        while let Ok(id) = rx.try_recv() {
            report.push(id.to_string(), Outcome::failed(&PipelineError::Cancelled));
        }

        report.sort();
        info!(
            succeeded = report.succeeded().count(),
            skipped = report.skipped().count(),
            failed = report.failed().count(),
            "Run finished"
        );
        report
    }

    async fn log_rate_limits(&self) {
        for (name, result) in self.inner.repositories.rate_limits().await {
            match result {
                Ok(status) if status.is_exhausted() => {
                    warn!(repository = %name, reset_at = ?status.reset_at(), "Request quota exhausted; fetches may be rate limited");
                }
                Ok(_) => {}
                Err(onekey_client::FetchError::AuthRequired(msg)) => {
                    warn!(repository = %name, %msg, "Rate limit check rejected credentials");
                }
                Err(e) => debug!(repository = %name, error = %e, "Rate limit check failed"),
            }
        }
    }
}

impl Inner {
    async fn process(
        &self,
        id: Identifier,
        index_cache: &IndexCache,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) {
        let selected = match self.select(id.app_id, index_cache).await {
            Ok(selected) => selected,
            Err(e) => {
                report.push(id.to_string(), Outcome::failed(&e.into()));
                return;
            }
        };

        let entries = selected.index.entries_for(id.depot_id);
        if entries.is_empty() {
            let what = match id.depot_id {
                Some(depot) => format!("depot {depot} of app {}", id.app_id),
                None => format!("any depot of app {}", id.app_id),
            };
            let error = onekey_client::FetchError::NotFound(format!(
                "{what} in repository {}",
                selected.client.name()
            ));
            report.push(id.to_string(), Outcome::failed(&error.into()));
            return;
        }

        for entry in entries {
            let target = entry.depot_key().to_string();
            if cancel.is_cancelled() {
                report.push(target, Outcome::failed(&PipelineError::Cancelled));
                continue;
            }
            let outcome = match self.fetch_one(&selected, entry).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(depot = %target, reason = e.reason(), error = %e, "Depot failed");
                    Outcome::failed(&e)
                }
            };
            report.push(target, outcome);
        }
    }

    async fn select(&self, app: AppId, index_cache: &IndexCache) -> FetchResult<Selected> {
        let cell = index_cache.entry(app).or_default().clone();
        cell.get_or_init(|| self.repositories.select_latest(app))
            .await
            .clone()
    }

    async fn fetch_one(&self, selected: &Selected, entry: &ManifestEntry) -> PipelineResult<Outcome> {
        let depot_key = entry.depot_key();
        if let Some(current) = self.store.current_revision(&depot_key).await?
            && current >= entry.revision
        {
            debug!(depot = %depot_key, current, offered = entry.revision, "Already up to date");
            return Ok(Outcome::Skipped { revision: current });
        }

        let bytes = selected.client.fetch_manifest(entry).await?;
        let verified = self.verifier.verify(entry, bytes)?;
        let outcome = match self.store.commit(&verified).await? {
            StoreOutcome::Written { previous_revision } => Outcome::Written {
                revision: entry.revision,
                previous_revision,
            },
            StoreOutcome::AlreadyUpToDate { current_revision } => Outcome::Skipped {
                revision: current_revision,
            },
        };
        Ok(outcome)
    }
}
