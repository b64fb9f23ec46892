//! Core domain types and shared logic for the Onekey manifest downloader.
//!
//! This crate defines the canonical data model used across all other crates:
//! - App, depot and manifest identifiers
//! - Content hashes
//! - Manifest entries, repository indexes and local records
//! - Client configuration

pub mod config;
pub mod error;
pub mod hash;
pub mod ids;
pub mod manifest;

pub use config::ClientConfig;
pub use error::{Error, Result};
pub use hash::{ContentHash, ContentHasher};
pub use ids::{AppId, DepotId, DepotKey, Identifier, ManifestId, ManifestKey};
pub use manifest::{
    LocalManifestRecord, ManifestEntry, ManifestSignature, RepositoryIndex, VerificationStatus,
};

/// Maximum accepted manifest payload: 64 MiB
pub const MAX_MANIFEST_SIZE: u64 = 64 * 1024 * 1024;
