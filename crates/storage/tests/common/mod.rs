pub mod mocks;

#[allow(unused_imports)]
pub use mocks::FaultyBackend;

use bytes::Bytes;
use onekey_core::{AppId, ContentHash, DepotId, ManifestEntry, ManifestId};
use onekey_signer::{ManifestVerifier, VerifiedManifest};

/// Build a verified manifest for app 440 with the given depot, manifest id and revision.
#[allow(dead_code)]
pub fn verified(depot: u32, manifest: u64, revision: u64, data: &'static [u8]) -> VerifiedManifest {
    let entry = ManifestEntry {
        app_id: AppId(440),
        depot_id: DepotId(depot),
        manifest_id: ManifestId(manifest),
        revision,
        content_hash: ContentHash::compute(data),
        size: data.len() as u64,
        signature: None,
    };
    ManifestVerifier::default()
        .verify(&entry, Bytes::from_static(data))
        .expect("fixture manifest verifies")
}
