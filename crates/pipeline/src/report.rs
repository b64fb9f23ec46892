//! Per-run summary of what happened to each requested depot.

use crate::error::PipelineError;
use std::fmt;

/// What happened to one target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// A manifest was verified and written.
    Written {
        revision: u64,
        previous_revision: Option<u64>,
    },
    /// The stored manifest was already at this revision or newer.
    Skipped { revision: u64 },
    Failed {
        reason: &'static str,
        message: String,
    },
}

impl Outcome {
    pub fn failed(error: &PipelineError) -> Self {
        Self::Failed {
            reason: error.reason(),
            message: error.to_string(),
        }
    }
}

/// One line of the report. `target` is `app/depot`, or the bare identifier
/// when the failure happened before depots were known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportItem {
    pub target: String,
    pub outcome: Outcome,
}

/// Result of a pipeline run.
#[derive(Clone, Debug, Default)]
pub struct RunReport {
    pub items: Vec<ReportItem>,
}

impl RunReport {
    pub fn push(&mut self, target: impl Into<String>, outcome: Outcome) {
        self.items.push(ReportItem {
            target: target.into(),
            outcome,
        });
    }

    /// Sort items by target for stable output.
    pub fn sort(&mut self) {
        self.items.sort_by(|a, b| a.target.cmp(&b.target));
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &ReportItem> {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, Outcome::Written { .. }))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &ReportItem> {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, Outcome::Skipped { .. }))
    }

    pub fn failed(&self) -> impl Iterator<Item = &ReportItem> {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, Outcome::Failed { .. }))
    }

    /// A run succeeds when nothing failed; skips count as success.
    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_success() { 0 } else { 1 }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Succeeded: {}", self.succeeded().count())?;
        for item in self.succeeded() {
            if let Outcome::Written {
                revision,
                previous_revision,
            } = &item.outcome
            {
                match previous_revision {
                    Some(prev) => writeln!(f, "  {}  revision {revision} (was {prev})", item.target)?,
                    None => writeln!(f, "  {}  revision {revision}", item.target)?,
                }
            }
        }

        writeln!(f, "Skipped: {}", self.skipped().count())?;
        for item in self.skipped() {
            if let Outcome::Skipped { revision } = &item.outcome {
                writeln!(f, "  {}  revision {revision} already up to date", item.target)?;
            }
        }

        write!(f, "Failed: {}", self.failed().count())?;
        for item in self.failed() {
            if let Outcome::Failed { reason, message } = &item.outcome {
                write!(f, "\n  {}  {reason}: {message}", item.target)?;
            }
        }
        Ok(())
    }
}
