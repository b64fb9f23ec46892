//! The local manifest store.
//!
//! Layout under the store root:
//!
//! ```text
//! manifests/{app}/{depot}_{manifest}.manifest   verified manifest bytes
//! records/{app}/{depot}.json                    LocalManifestRecord (commit point)
//! .staging/                                     in-progress writes
//! ```
//!
//! A commit writes the payload first and the record second. Readers only
//! follow records, so a crash between the two renames leaves the previous
//! record and its payload in place. A payload no record points at is an
//! orphan; a failed commit removes its own, and `audit` reports any others.

use crate::error::{StorageError, StorageResult};
use crate::traits::ObjectStore;
use bytes::Bytes;
use dashmap::DashMap;
use onekey_core::{DepotKey, LocalManifestRecord, ManifestEntry};
use onekey_signer::VerifiedManifest;
use std::collections::HashSet;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::instrument;

const RECORDS_PREFIX: &str = "records/";
const MANIFESTS_PREFIX: &str = "manifests/";

/// Store key of the record for a depot.
pub fn record_key(key: &DepotKey) -> String {
    format!("{RECORDS_PREFIX}{}/{}.json", key.app_id, key.depot_id)
}

/// Store key of the payload for a manifest entry.
pub fn payload_key(entry: &ManifestEntry) -> String {
    format!("{MANIFESTS_PREFIX}{}/{}", entry.app_id, entry.payload_file_name())
}

/// Result of a successful commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The manifest was written. `previous_revision` is the revision it replaced.
    Written { previous_revision: Option<u64> },
    /// The stored record already had an equal or newer revision; nothing was written.
    AlreadyUpToDate { current_revision: u64 },
}

/// One problem found by [`ManifestStore::audit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditIssue {
    pub key: DepotKey,
    pub payload_key: String,
    pub problem: String,
}

/// Summary of a store audit.
#[derive(Clone, Debug, Default)]
pub struct AuditReport {
    pub checked: usize,
    pub issues: Vec<AuditIssue>,
    /// Payload keys no record refers to.
    pub orphaned_payloads: Vec<String>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty() && self.orphaned_payloads.is_empty()
    }

    pub fn problem_count(&self) -> usize {
        self.issues.len() + self.orphaned_payloads.len()
    }
}

/// Writer and reader for verified manifests.
#[derive(Clone)]
pub struct ManifestStore {
    backend: Arc<dyn ObjectStore>,
    locks: Arc<DashMap<DepotKey, Arc<Mutex<()>>>>,
}

impl ManifestStore {
    /// Open a store on `backend`, checking it is usable and clearing staging debris.
    pub async fn open(backend: Arc<dyn ObjectStore>) -> StorageResult<Self> {
        backend.health_check().await?;
        let removed = backend.clean_staging().await?;
        tracing::debug!(backend = backend.backend_name(), removed, "Manifest store opened");
        Ok(Self::with_backend(backend))
    }

    /// Open a store for reading without touching staging, so writes in
    /// progress from another process are left alone.
    pub async fn open_read_only(backend: Arc<dyn ObjectStore>) -> StorageResult<Self> {
        backend.health_check().await?;
        tracing::debug!(backend = backend.backend_name(), "Manifest store opened for reading");
        Ok(Self::with_backend(backend))
    }

    fn with_backend(backend: Arc<dyn ObjectStore>) -> Self {
        Self {
            backend,
            locks: Arc::new(DashMap::new()),
        }
    }

    fn lock_for(&self, key: DepotKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Persist a verified manifest.
    ///
    /// Overwrites the depot's record only when the new revision is strictly
    /// newer. Any failure leaves the previous record and payload untouched.
    #[instrument(skip(self, manifest), fields(manifest = %manifest.entry().key()))]
    pub async fn commit(&self, manifest: &VerifiedManifest) -> StorageResult<StoreOutcome> {
        let entry = manifest.entry();
        let depot_key = entry.depot_key();
        let lock = self.lock_for(depot_key);
        let _guard = lock.lock().await;

        let existing = self.record(&depot_key).await?;
        if let Some(current) = &existing {
            if current.entry.manifest_id == entry.manifest_id
                && current.entry.content_hash != entry.content_hash
            {
                return Err(StorageError::Conflict {
                    key: entry.key().to_string(),
                    detail: format!(
                        "stored hash {} differs from {}",
                        current.entry.content_hash.short(),
                        entry.content_hash.short()
                    ),
                });
            }
            if entry.revision <= current.entry.revision {
                tracing::debug!(
                    current = current.entry.revision,
                    offered = entry.revision,
                    "Stored record is up to date"
                );
                return Ok(StoreOutcome::AlreadyUpToDate {
                    current_revision: current.entry.revision,
                });
            }
        }

        let payload = payload_key(entry);
        self.backend.put(&payload, manifest.bytes().clone()).await?;

        let record = LocalManifestRecord {
            entry: entry.clone(),
            payload_key: payload.clone(),
            retrieved_at: OffsetDateTime::now_utc(),
            verification: manifest.status().clone(),
        };
        let json = record
            .to_json()
            .map_err(|e| StorageError::Record(e.to_string()))?;
        if let Err(e) = self
            .backend
            .put(&record_key(&depot_key), Bytes::from(json))
            .await
        {
            // The previous record may still point at this payload
            let shared = existing.as_ref().is_some_and(|old| old.payload_key == payload);
            if !shared && let Err(cleanup) = self.backend.delete(&payload).await {
                tracing::warn!(payload = %payload, error = %cleanup, "Failed to remove unrecorded payload");
            }
            return Err(e);
        }

        let previous_revision = existing.as_ref().map(|r| r.entry.revision);
        if let Some(old) = existing
            && old.payload_key != payload
            && let Err(e) = self.backend.delete(&old.payload_key).await
        {
            tracing::warn!(payload = %old.payload_key, error = %e, "Failed to remove superseded payload");
        }

        tracing::info!(
            revision = entry.revision,
            previous = ?previous_revision,
            "Manifest committed"
        );
        Ok(StoreOutcome::Written { previous_revision })
    }

    /// Read the record for a depot. A corrupt record is reported as absent.
    pub async fn record(&self, key: &DepotKey) -> StorageResult<Option<LocalManifestRecord>> {
        let rkey = record_key(key);
        let data = match self.backend.get(&rkey).await {
            Ok(data) => data,
            Err(StorageError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        match LocalManifestRecord::from_json(&data) {
            Ok(record) if record.entry.depot_key() == *key => Ok(Some(record)),
            Ok(record) => {
                tracing::warn!(record = %rkey, found = %record.entry.depot_key(), "Record belongs to another depot, ignoring");
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(record = %rkey, error = %e, "Corrupt record, treating as absent");
                Ok(None)
            }
        }
    }

    /// Revision currently stored for a depot.
    pub async fn current_revision(&self, key: &DepotKey) -> StorageResult<Option<u64>> {
        Ok(self.record(key).await?.map(|r| r.entry.revision))
    }

    /// All readable records, sorted by depot key.
    pub async fn records(&self) -> StorageResult<Vec<LocalManifestRecord>> {
        let mut records = Vec::new();
        for rkey in self.backend.list(RECORDS_PREFIX).await? {
            let data = match self.backend.get(&rkey).await {
                Ok(data) => data,
                Err(StorageError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            match LocalManifestRecord::from_json(&data) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(record = %rkey, error = %e, "Skipping corrupt record"),
            }
        }
        records.sort_by_key(|r| r.entry.depot_key());
        Ok(records)
    }

    /// Payload bytes of the manifest currently recorded for a depot.
    pub async fn payload(&self, key: &DepotKey) -> StorageResult<Bytes> {
        let record = self
            .record(key)
            .await?
            .ok_or_else(|| StorageError::NotFound(record_key(key)))?;
        self.backend.get(&record.payload_key).await
    }

    /// Re-hash every recorded payload against its record and list payloads
    /// that no record refers to.
    #[instrument(skip(self))]
    pub async fn audit(&self) -> StorageResult<AuditReport> {
        let mut report = AuditReport::default();
        let records = self.records().await?;
        let referenced: HashSet<&str> = records.iter().map(|r| r.payload_key.as_str()).collect();
        report.orphaned_payloads = self
            .backend
            .list(MANIFESTS_PREFIX)
            .await?
            .into_iter()
            .filter(|key| !referenced.contains(key.as_str()))
            .collect();
        for orphan in &report.orphaned_payloads {
            tracing::warn!(payload = %orphan, "Payload has no record");
        }

        for record in &records {
            report.checked += 1;
            let key = record.entry.depot_key();
            let problem = match self.backend.get(&record.payload_key).await {
                Ok(data) if data.len() as u64 != record.entry.size => Some(format!(
                    "size mismatch: expected {}, got {}",
                    record.entry.size,
                    data.len()
                )),
                Ok(data) => record.entry.content_hash.verify(&data).err().map(|e| e.to_string()),
                Err(StorageError::NotFound(_)) => Some("payload missing".to_string()),
                Err(e) => return Err(e),
            };
            if let Some(problem) = problem {
                tracing::warn!(depot = %key, %problem, "Stored manifest failed audit");
                report.issues.push(AuditIssue {
                    key,
                    payload_key: record.payload_key.clone(),
                    problem,
                });
            }
        }
        Ok(report)
    }
}
