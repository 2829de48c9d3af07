//! Progress math and structured progress events.
//!
//! The runner never prints. It emits [`ProgressEvent`]s through a
//! [`ProgressReporter`], which the CLI renders with `tracing` and tests
//! record for assertions.

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::stats::RunStats;

// =============================================================================
// Progress Math
// =============================================================================

/// Point-in-time progress of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    /// Items processed during this invocation.
    pub processed: u64,
    /// Items expected for this invocation, when the work source can count.
    pub total: Option<u64>,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    pub fn new(processed: u64, total: Option<u64>, elapsed: Duration) -> Self {
        Self {
            processed,
            total,
            elapsed,
        }
    }

    /// Items per second. Zero when no time has elapsed.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.processed as f64 / secs
    }

    /// `(total - processed) / throughput`.
    ///
    /// `None` when the total is unknown or throughput is zero.
    pub fn eta(&self) -> Option<Duration> {
        let total = self.total?;
        let throughput = self.throughput();
        if throughput <= 0.0 || !throughput.is_finite() {
            return None;
        }
        let remaining = total.saturating_sub(self.processed) as f64;
        Some(Duration::from_secs_f64(remaining / throughput))
    }

    /// Completion percentage, when the total is known and non-zero.
    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(0) | None => None,
            Some(total) => Some(self.processed as f64 * 100.0 / total as f64),
        }
    }
}

/// Tracks elapsed time since the run started.
#[derive(Debug, Clone, Copy)]
pub struct ProgressTracker {
    started: Instant,
    total: Option<u64>,
}

impl ProgressTracker {
    pub fn start(total: Option<u64>) -> Self {
        Self {
            started: Instant::now(),
            total,
        }
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self, processed: u64) -> ProgressSnapshot {
        ProgressSnapshot::new(processed, self.total, self.elapsed())
    }
}

/// Formats a duration as `1h02m03s`, `4m05s`, or `6s`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h{:02}m{:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m{:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

// =============================================================================
// Progress Events
// =============================================================================

/// Events emitted by the batch runner.
#[derive(Debug, Clone)]
pub enum ProgressEvent<'a> {
    /// Run started; `total` is the pending count when known.
    RunStarted {
        job: &'a str,
        total: Option<u64>,
        batch_size: usize,
        dry_run: bool,
    },
    /// An existing checkpoint was found and will be resumed.
    Resumed {
        job: &'a str,
        cursor: &'a str,
        previous: &'a RunStats,
    },
    BatchStarted {
        batch: usize,
        size: usize,
    },
    /// Item skipped without a write.
    ItemSkipped {
        id: &'a str,
        reason: &'a str,
    },
    /// Item failed after retries, or its write failed.
    ItemFailed {
        id: &'a str,
        error: &'a str,
    },
    BatchCompleted {
        batch: usize,
        stats: &'a RunStats,
        progress: ProgressSnapshot,
    },
    CheckpointSaved {
        path: &'a Path,
        cursor: &'a str,
    },
    /// Checkpoint could not be written; the run continues.
    CheckpointFailed {
        path: &'a Path,
        error: &'a str,
    },
    RunCompleted {
        job: &'a str,
        stats: &'a RunStats,
        elapsed: Duration,
    },
    /// `--limit` reached; checkpoint kept for the next run.
    LimitReached {
        job: &'a str,
        stats: &'a RunStats,
        limit: usize,
    },
    /// Cancelled by a signal; checkpoint kept at the last completed batch.
    RunInterrupted {
        job: &'a str,
        stats: &'a RunStats,
        cursor: Option<&'a str>,
    },
}

/// Trait for reporting run progress.
pub trait ProgressReporter: Send + Sync {
    /// Called when a progress event occurs.
    ///
    /// The default implementation does nothing (silent mode).
    fn report(&self, event: ProgressEvent<'_>) {
        let _ = event;
    }
}

/// Silent reporter that ignores all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Tracing-based reporter for CLI logging.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: ProgressEvent<'_>) {
        match event {
            ProgressEvent::RunStarted {
                job,
                total,
                batch_size,
                dry_run,
            } => match total {
                Some(total) => info!(job, total, batch_size, dry_run, "Starting run"),
                None => info!(job, batch_size, dry_run, "Starting run (pending count unknown)"),
            },
            ProgressEvent::Resumed {
                job,
                cursor,
                previous,
            } => {
                info!(
                    job,
                    cursor,
                    processed = previous.processed,
                    successful = previous.successful,
                    failed = previous.failed,
                    "Resuming from checkpoint"
                );
            }
            ProgressEvent::BatchStarted { batch, size } => {
                debug!(batch, size, "Processing batch");
            }
            ProgressEvent::ItemSkipped { id, reason } => {
                debug!(id, reason, "Skipped");
            }
            ProgressEvent::ItemFailed { id, error } => {
                warn!(id, error, "Failed");
            }
            ProgressEvent::BatchCompleted {
                batch,
                stats,
                progress,
            } => {
                let eta = progress
                    .eta()
                    .map(format_duration)
                    .unwrap_or_else(|| "-".to_string());
                let of_total = progress
                    .total
                    .map(|t| format!("/{}", t))
                    .unwrap_or_default();
                info!(
                    batch,
                    successful = stats.successful,
                    failed = stats.failed,
                    skipped = stats.skipped,
                    "Progress: {}{} | {:.2}/s | elapsed {} | ETA {}",
                    progress.processed,
                    of_total,
                    progress.throughput(),
                    format_duration(progress.elapsed),
                    eta
                );
            }
            ProgressEvent::CheckpointSaved { path, cursor } => {
                debug!(path = %path.display(), cursor, "Checkpoint saved");
            }
            ProgressEvent::CheckpointFailed { path, error } => {
                warn!(path = %path.display(), error, "Failed to save checkpoint");
            }
            ProgressEvent::RunCompleted {
                job,
                stats,
                elapsed,
            } => {
                info!(
                    job,
                    processed = stats.processed,
                    successful = stats.successful,
                    failed = stats.failed,
                    skipped = stats.skipped,
                    elapsed = %format_duration(elapsed),
                    "Run completed"
                );
            }
            ProgressEvent::LimitReached { job, stats, limit } => {
                info!(
                    job,
                    limit,
                    processed = stats.processed,
                    "Limit reached, checkpoint kept for the next run"
                );
            }
            ProgressEvent::RunInterrupted { job, stats, cursor } => {
                warn!(
                    job,
                    processed = stats.processed,
                    cursor = cursor.unwrap_or("-"),
                    "Run interrupted, progress saved"
                );
            }
        }
    }
}
