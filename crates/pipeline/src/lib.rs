//! The Onekey fetch pipeline.
//!
//! This crate provides:
//! - Identifier parsing for command-line arguments and batch files
//! - A bounded worker pool running fetch → verify → store per identifier
//! - Run reports with per-depot outcomes and failure reasons

pub mod error;
pub mod report;
pub mod request;
pub mod worker;

pub use error::{PipelineError, PipelineResult};
pub use report::{Outcome, ReportItem, RunReport};
pub use request::{dedup, parse_batch, parse_identifiers, read_batch_file};
pub use worker::{DEFAULT_WORKERS, Pipeline};

pub use tokio_util::sync::CancellationToken;
