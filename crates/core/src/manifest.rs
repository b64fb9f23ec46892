//! Manifest entries, repository indexes and local records.

use crate::hash::ContentHash;
use crate::ids::{AppId, DepotId, DepotKey, ManifestId, ManifestKey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use time::OffsetDateTime;

/// Version tag embedded in signed fingerprints.
const FINGERPRINT_VERSION: u32 = 1;

/// A detached signature over a manifest entry fingerprint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSignature {
    /// Name of the signing key (matches a trusted key's name).
    pub key_name: String,
    /// Base64-encoded ed25519 signature.
    pub signature: String,
}

/// One manifest available in a repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub app_id: AppId,
    pub depot_id: DepotId,
    pub manifest_id: ManifestId,
    /// Monotonic revision of the depot; higher is newer.
    pub revision: u64,
    /// SHA-256 of the manifest bytes.
    pub content_hash: ContentHash,
    /// Length of the manifest bytes.
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<ManifestSignature>,
}

impl ManifestEntry {
    pub fn key(&self) -> ManifestKey {
        ManifestKey {
            app_id: self.app_id,
            depot_id: self.depot_id,
            manifest_id: self.manifest_id,
        }
    }

    pub fn depot_key(&self) -> DepotKey {
        DepotKey::new(self.app_id, self.depot_id)
    }

    /// The string covered by a [`ManifestSignature`].
    pub fn fingerprint(&self) -> String {
        format!(
            "onekey-manifest;{};{};{};{};{};{};{}",
            FINGERPRINT_VERSION,
            self.app_id,
            self.depot_id,
            self.manifest_id,
            self.revision,
            self.content_hash.to_hex(),
            self.size
        )
    }

    /// File name of the payload as consumed downstream: `{depot}_{manifest}.manifest`.
    pub fn payload_file_name(&self) -> String {
        format!("{}_{}.manifest", self.depot_id, self.manifest_id)
    }
}

/// The set of manifests a repository offers for one app.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepositoryIndex {
    pub app_id: AppId,
    /// When the repository last updated this app.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default)]
    pub entries: Vec<ManifestEntry>,
}

impl RepositoryIndex {
    /// Check that every entry belongs to this app and that no entry is listed twice.
    pub fn validate(&self) -> crate::Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            if entry.app_id != self.app_id {
                return Err(crate::Error::InvalidIndex(format!(
                    "entry {} does not belong to app {}",
                    entry.key(),
                    self.app_id
                )));
            }
            if !seen.insert((entry.depot_id, entry.manifest_id)) {
                return Err(crate::Error::InvalidIndex(format!(
                    "duplicate entry {}",
                    entry.key()
                )));
            }
        }
        Ok(())
    }

    /// Entries for one depot, or all entries when `depot` is `None`.
    ///
    /// When a depot is listed with several manifests only the highest revision is kept.
    pub fn entries_for(&self, depot: Option<DepotId>) -> Vec<&ManifestEntry> {
        let mut latest: Vec<&ManifestEntry> = Vec::new();
        for entry in self
            .entries
            .iter()
            .filter(|e| depot.is_none_or(|d| e.depot_id == d))
        {
            match latest.iter_mut().find(|e| e.depot_id == entry.depot_id) {
                Some(slot) if slot.revision < entry.revision => *slot = entry,
                Some(_) => {}
                None => latest.push(entry),
            }
        }
        latest.sort_by_key(|e| e.depot_id);
        latest
    }

    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| crate::Error::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| crate::Error::Serialization(e.to_string()))
    }
}

/// How a stored manifest was verified.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Content hash and size matched; no signature was checked.
    HashVerified,
    /// Content hash matched and the signature verified with a trusted key.
    SignatureVerified { key_name: String },
}

/// The on-disk record of a verified manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalManifestRecord {
    pub entry: ManifestEntry,
    /// Store key of the payload file this record points at.
    pub payload_key: String,
    #[serde(with = "time::serde::rfc3339")]
    pub retrieved_at: OffsetDateTime,
    pub verification: VerificationStatus,
}

impl LocalManifestRecord {
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| crate::Error::Serialization(e.to_string()))
    }

    pub fn from_json(json: &[u8]) -> crate::Result<Self> {
        serde_json::from_slice(json).map_err(|e| crate::Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn entry(depot: u32, manifest: u64, revision: u64) -> ManifestEntry {
        ManifestEntry {
            app_id: AppId(440),
            depot_id: DepotId(depot),
            manifest_id: ManifestId(manifest),
            revision,
            content_hash: ContentHash::compute(format!("{depot}-{manifest}").as_bytes()),
            size: 10,
            signature: None,
        }
    }

    fn index(entries: Vec<ManifestEntry>) -> RepositoryIndex {
        RepositoryIndex {
            app_id: AppId(440),
            updated_at: datetime!(2024-05-01 12:00 UTC),
            entries,
        }
    }

    #[test]
    fn test_fingerprint_covers_every_field() {
        let e = entry(441, 99, 3);
        let fp = e.fingerprint();
        assert!(fp.starts_with("onekey-manifest;1;440;441;99;3;"));
        assert!(fp.ends_with(";10"));

        let mut other = e.clone();
        other.revision = 4;
        assert_ne!(fp, other.fingerprint());
    }

    #[test]
    fn test_validate_rejects_foreign_and_duplicate_entries() {
        assert!(index(vec![entry(441, 1, 1), entry(442, 2, 1)]).validate().is_ok());

        let mut foreign = entry(441, 1, 1);
        foreign.app_id = AppId(570);
        assert!(matches!(
            index(vec![foreign]).validate(),
            Err(crate::Error::InvalidIndex(_))
        ));

        assert!(matches!(
            index(vec![entry(441, 1, 1), entry(441, 1, 2)]).validate(),
            Err(crate::Error::InvalidIndex(_))
        ));
    }

    #[test]
    fn test_entries_for_keeps_latest_revision_per_depot() {
        let idx = index(vec![entry(442, 5, 1), entry(441, 1, 1), entry(441, 2, 7), entry(441, 3, 4)]);

        let all = idx.entries_for(None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].depot_id, DepotId(441));
        assert_eq!(all[0].manifest_id, ManifestId(2));
        assert_eq!(all[1].depot_id, DepotId(442));

        let one = idx.entries_for(Some(DepotId(442)));
        assert_eq!(one.len(), 1);
        assert!(idx.entries_for(Some(DepotId(999))).is_empty());
    }

    #[test]
    fn test_index_json_shape() {
        let json = r#"{
            "app_id": 440,
            "updated_at": "2024-05-01T12:00:00Z",
            "entries": [{
                "app_id": 440,
                "depot_id": 441,
                "manifest_id": 7280959080077824592,
                "revision": 3,
                "content_hash": "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9",
                "size": 11
            }]
        }"#;
        let idx = RepositoryIndex::from_json(json).unwrap();
        assert_eq!(idx.entries.len(), 1);
        assert_eq!(idx.entries[0].manifest_id, ManifestId(7280959080077824592));
        assert!(idx.entries[0].signature.is_none());
        assert_eq!(
            idx.entries[0].payload_file_name(),
            "441_7280959080077824592.manifest"
        );
    }

    #[test]
    fn test_record_json_roundtrip_preserves_status() {
        let record = LocalManifestRecord {
            entry: entry(441, 1, 1),
            payload_key: "manifests/440/441_1.manifest".to_string(),
            retrieved_at: datetime!(2024-05-01 12:00 UTC),
            verification: VerificationStatus::SignatureVerified {
                key_name: "repo-1".to_string(),
            },
        };
        let json = record.to_json().unwrap();
        assert!(json.contains("\"status\": \"signature_verified\""));
        assert_eq!(LocalManifestRecord::from_json(json.as_bytes()).unwrap(), record);
    }
}
