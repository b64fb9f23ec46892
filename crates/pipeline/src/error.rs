//! Pipeline error types.

use onekey_client::FetchError;
use onekey_signer::{SignerError, VerifyError};
use onekey_storage::StorageError;
use thiserror::Error;

/// Why one identifier or depot could not be processed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cancelled before processing")]
    Cancelled,

    #[error("worker stopped unexpectedly: {0}")]
    WorkerFailed(String),
}

impl PipelineError {
    /// Short label used in run reports.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Fetch(e) => e.reason(),
            Self::Verify(VerifyError::Integrity { .. }) => "integrity",
            Self::Verify(VerifyError::Authenticity { .. }) => "authenticity",
            Self::Storage(StorageError::Conflict { .. }) => "conflict",
            Self::Storage(_) => "storage",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Config(_) => "config",
            Self::Cancelled => "cancelled",
            Self::WorkerFailed(_) => "internal",
        }
    }
}

impl From<onekey_core::Error> for PipelineError {
    fn from(e: onekey_core::Error) -> Self {
        match e {
            onekey_core::Error::InvalidIdentifier(msg) => Self::InvalidRequest(msg),
            other => Self::Config(other.to_string()),
        }
    }
}

impl From<SignerError> for PipelineError {
    fn from(e: SignerError) -> Self {
        Self::Config(format!("trusted keys: {e}"))
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
