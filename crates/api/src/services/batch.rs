//! Batch outcome policies.
//!
//! Sync and assignment both process many rows and count what happened to
//! each. They differ in what a failed row means for the batch:
//!
//! - [`BestEffortBatch`]: failures are counted and logged, the batch succeeds.
//! - [`AtomicBatch`]: any failure fails the whole batch, which the caller
//!   then rolls back.

use serde::Serialize;

use super::error::FieldError;

/// Counters and per-item errors of one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub errors: Vec<FieldError>,
}

/// What happened to one successfully processed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Created,
    Updated,
    Unchanged,
}

impl BatchReport {
    pub fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Created => self.created += 1,
            ItemOutcome::Updated => self.updated += 1,
            ItemOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn fail(&mut self, item: impl Into<String>, message: impl Into<String>) {
        self.failed += 1;
        self.errors.push(FieldError::new(item, message));
    }

    /// Items seen, successful or not.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.created + self.updated + self.unchanged + self.failed
    }
}

/// Decides whether a batch with failures still counts as a success.
pub trait BatchPolicy {
    /// Name used in logs.
    const NAME: &'static str;

    /// # Errors
    ///
    /// Returns the report back when the batch must be treated as failed.
    fn settle(report: BatchReport) -> Result<BatchReport, BatchReport>;
}

/// Failures are tolerated; used by spreadsheet sync.
pub struct BestEffortBatch;

impl BatchPolicy for BestEffortBatch {
    const NAME: &'static str = "best_effort";

    fn settle(report: BatchReport) -> Result<BatchReport, BatchReport> {
        if report.failed > 0 {
            tracing::warn!(
                policy = Self::NAME,
                failed = report.failed,
                total = report.total(),
                "Batch finished with failed items"
            );
        }
        Ok(report)
    }
}

/// All or nothing; used by courier assignment.
pub struct AtomicBatch;

impl BatchPolicy for AtomicBatch {
    const NAME: &'static str = "atomic";

    fn settle(report: BatchReport) -> Result<BatchReport, BatchReport> {
        if report.failed == 0 {
            return Ok(report);
        }
        tracing::warn!(
            policy = Self::NAME,
            failed = report.failed,
            total = report.total(),
            "Batch rejected because of failed items"
        );
        Err(report)
    }
}
