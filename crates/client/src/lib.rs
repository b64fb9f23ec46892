//! Repository client for Onekey.
//!
//! This crate provides:
//! - HTTP access to manifest repositories with mirror fallback
//! - Exponential backoff with jitter for transient failures
//! - Coalescing of concurrent requests for the same manifest
//! - Selection of the most recently updated repository for an app

pub mod backoff;
pub mod coalesce;
pub mod error;
pub mod repository;
pub mod selector;

pub use backoff::{Clock, RecordingClock, RetryPolicy, RetryState, SystemClock};
pub use coalesce::{Coalescer, CoalescerStats};
pub use error::{FetchError, FetchResult};
pub use repository::{RATE_LIMIT_CACHE_TTL, RateLimitStatus, RepositoryClient};
pub use selector::{RepositorySet, Selected};
