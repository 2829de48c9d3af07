//! Run statistics and outcomes.
//!
//! Pure bookkeeping, decoupled from I/O. The same counters are persisted in
//! the checkpoint and printed in the final summary.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outcome of processing a single work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// External call and write both succeeded
    Succeeded,
    /// Item was not eligible, was missing upstream, or this is a dry run
    Skipped,
    /// External call or write failed
    Failed,
}

/// Counters for a run. Monotonically non-decreasing.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an outcome, incrementing `processed` and the matching counter.
    pub fn record(&mut self, outcome: ItemOutcome) {
        self.processed += 1;
        match outcome {
            ItemOutcome::Succeeded => self.successful += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Failed => self.failed += 1,
        }
    }

    /// Adds another set of counters to this one.
    pub fn merge(&mut self, other: &RunStats) {
        self.processed += other.processed;
        self.successful += other.successful;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

/// Final state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Work source exhausted; checkpoint deleted.
    Completed,
    /// `--limit` reached before the work source was exhausted; checkpoint kept.
    LimitReached,
    /// Cancelled by a signal; checkpoint kept at the last completed batch.
    Interrupted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::LimitReached => "limit_reached",
            RunStatus::Interrupted => "interrupted",
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, RunStatus::Interrupted)
    }
}

/// Result of a [`BatchRunner`](crate::runner::BatchRunner) run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub status: RunStatus,
    /// Counters for this invocation only.
    pub stats: RunStats,
    /// Counters including earlier runs resumed from the checkpoint.
    pub cumulative: RunStats,
    /// Cursor of the last completed batch.
    pub last_processed_id: Option<String>,
    pub elapsed: Duration,
}

impl RunResult {
    pub fn is_interrupted(&self) -> bool {
        self.status.is_interrupted()
    }
}
