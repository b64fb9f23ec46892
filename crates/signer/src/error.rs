//! Signer and verifier error types.

use thiserror::Error;

/// Key handling and signing errors.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("key parsing error: {0}")]
    KeyParsing(String),

    #[error("verification failed")]
    VerificationFailed,

    #[error("invalid signature format: {0}")]
    InvalidSignature(String),

    #[error("unknown signing key: {0}")]
    UnknownKey(String),
}

/// Result type for signing operations.
pub type SignerResult<T> = std::result::Result<T, SignerError>;

/// Reasons a downloaded manifest is rejected.
///
/// Both variants are fatal for the manifest: it is discarded and never stored.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("integrity error for {key}: {detail}")]
    Integrity { key: String, detail: String },

    #[error("authenticity error for {key}: {detail}")]
    Authenticity { key: String, detail: String },
}
