//! Manifest signing and verification for Onekey.
//!
//! This crate provides:
//! - Ed25519 key generation and `name:base64` key strings
//! - Manifest fingerprint signing
//! - The manifest verifier (content hash, size and signature checks)

pub mod error;
pub mod key;
pub mod signer;
pub mod verifier;

pub use error::{SignerError, SignerResult, VerifyError};
pub use key::{KeyPair, PublicKey, SecretKey};
pub use signer::{ManifestSigner, TrustedKeys, verify_signature};
pub use verifier::{ManifestVerifier, VerifiedManifest};
