//! Batch-Checkpoint-Resume runner.
//!
//! The [`BatchRunner`] is generic over three traits:
//! - [`WorkSource`] - keyset-paginated selection of pending rows
//! - [`ExternalCall`] - the provider step of a job
//! - [`ResultWriter`] - idempotent persistence of results
//!
//! # Loop
//!
//! 1. Load the checkpoint (or start fresh) and take its cursor.
//! 2. Fetch the next page of pending items with a key greater than the cursor.
//!    Pages hold a whole number of batches.
//! 3. Split the page into batches of `min(batch_size, provider limit)`.
//! 4. For each batch: rate-limited, retried, time-bounded calls, then upserts.
//!    A failed batch is recorded and the run moves on to the next one.
//! 5. After each batch, advance the cursor to the batch's last key and save
//!    the checkpoint.
//! 6. When the source is exhausted, delete the checkpoint.
//!
//! # Cancellation
//!
//! On cancellation the batch in flight is abandoned, its partial writes are
//! left in place (writes are idempotent), and the checkpoint keeps the cursor
//! of the last completed batch. The next run re-processes the abandoned batch.

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::batch::{Batcher, aligned_page_size, effective_batch_size};
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::progress::{ProgressEvent, ProgressReporter, ProgressTracker, SilentReporter};
use crate::rate_limit::RateLimiter;
use crate::retry::{retry_with_backoff, with_timeout};
use crate::stats::{ItemOutcome, RunResult, RunStats, RunStatus};
use crate::traits::{CallMode, ExternalCall, ResultWriter, WorkItem, WorkSource};
use crate::{AppError, RunConfig};

/// Outcome of one item within a batch.
#[derive(Debug)]
struct ItemReport {
    id: String,
    outcome: ItemOutcome,
    detail: Option<String>,
}

impl ItemReport {
    fn succeeded(item: &impl WorkItem) -> Self {
        Self {
            id: item.cursor_key().to_string(),
            outcome: ItemOutcome::Succeeded,
            detail: None,
        }
    }

    fn skipped(item: &impl WorkItem, reason: impl Into<String>) -> Self {
        Self {
            id: item.cursor_key().to_string(),
            outcome: ItemOutcome::Skipped,
            detail: Some(reason.into()),
        }
    }

    fn failed(item: &impl WorkItem, error: impl Into<String>) -> Self {
        Self {
            id: item.cursor_key().to_string(),
            outcome: ItemOutcome::Failed,
            detail: Some(error.into()),
        }
    }
}

/// Drives one backfill job to completion, interruption, or its limit.
///
/// # Example
///
/// ```ignore
/// use tubeline_core::{BatchRunner, EmbeddingJob, RunConfig, TracingReporter};
///
/// let runner = BatchRunner::new(pending, EmbeddingJob::new(openai), repo, config);
/// let result = runner.run(&TracingReporter, shutdown_token).await?;
/// println!("{} succeeded, {} failed", result.stats.successful, result.stats.failed);
/// ```
pub struct BatchRunner<S, C, W>
where
    S: WorkSource,
    C: ExternalCall<Item = S::Item>,
    W: ResultWriter<S::Item, C::Output>,
{
    source: S,
    call: C,
    writer: W,
    config: RunConfig,
    limiter: RateLimiter,
}

impl<S, C, W> Clone for BatchRunner<S, C, W>
where
    S: WorkSource,
    C: ExternalCall<Item = S::Item>,
    W: ResultWriter<S::Item, C::Output>,
{
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            call: self.call.clone(),
            writer: self.writer.clone(),
            config: self.config.clone(),
            limiter: self.limiter.clone(),
        }
    }
}

impl<S, C, W> BatchRunner<S, C, W>
where
    S: WorkSource,
    C: ExternalCall<Item = S::Item>,
    W: ResultWriter<S::Item, C::Output>,
{
    /// Creates a runner whose rate limiter follows `config.min_call_interval`.
    pub fn new(source: S, call: C, writer: W, config: RunConfig) -> Self {
        let limiter = RateLimiter::new(config.min_call_interval);
        Self {
            source,
            call,
            writer,
            config,
            limiter,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Batch size actually used: the configured size capped by the provider.
    pub fn batch_size(&self) -> usize {
        effective_batch_size(self.config.batch_size, self.call.max_batch_size())
    }

    /// Runs with a silent reporter and a token that is never cancelled.
    pub async fn run_to_completion(&self) -> Result<RunResult, AppError> {
        self.run(&SilentReporter, CancellationToken::new()).await
    }

    /// Runs the job until the source is exhausted, the limit is reached, or
    /// `cancel_token` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the work source fails or a provider reports a
    /// fatal error (bad credentials, exhausted quota). The checkpoint is saved
    /// first in the latter case. Per-item and per-batch failures are not
    /// errors; they are counted in [`RunResult::stats`].
    pub async fn run<R: ProgressReporter>(
        &self,
        reporter: &R,
        cancel_token: CancellationToken,
    ) -> Result<RunResult, AppError> {
        let job = self.call.name();
        let store = CheckpointStore::new(self.config.checkpoint_path_for(job), job);

        let mut checkpoint = if self.config.fresh {
            Checkpoint::new(job)
        } else {
            store.load()
        };

        if let Some(cursor) = checkpoint.last_processed_id.as_deref() {
            reporter.report(ProgressEvent::Resumed {
                job,
                cursor,
                previous: &checkpoint.stats,
            });
        }

        let total = match self
            .source
            .count_pending(checkpoint.last_processed_id.as_deref())
            .await
        {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(job, error = %e, "Could not count pending items, ETA unavailable");
                None
            }
        };
        let total = match (total, self.config.limit) {
            (Some(total), Some(limit)) => Some(total.min(limit as u64)),
            (total, _) => total,
        };

        let batch_size = self.batch_size();
        let page_size = aligned_page_size(self.config.page_size, batch_size);
        reporter.report(ProgressEvent::RunStarted {
            job,
            total,
            batch_size,
            dry_run: self.config.dry_run,
        });

        let tracker = ProgressTracker::start(total);
        let mut stats = RunStats::default();
        let mut batch_no = 0usize;

        let status = 'pages: loop {
            if cancel_token.is_cancelled() {
                break RunStatus::Interrupted;
            }

            let remaining = self
                .config
                .limit
                .map(|limit| limit.saturating_sub(stats.processed as usize));
            if remaining == Some(0) {
                break RunStatus::LimitReached;
            }
            // Within the limit, one extra row tells a finished source apart
            // from one that still has work left.
            let (take, request) = match remaining {
                Some(r) if r <= page_size => (r, r + 1),
                _ => (page_size, page_size),
            };

            let cursor = checkpoint.last_processed_id.clone();
            let mut page = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => break RunStatus::Interrupted,
                page = self.source.next_page(cursor.as_deref(), request) => page?,
            };
            let exhausted = page.len() < request;
            page.truncate(take);

            if let Some(after) = cursor.as_deref() {
                let fetched = page.len();
                page.retain(|item| item.cursor_key() > after);
                if page.len() < fetched {
                    tracing::warn!(
                        job,
                        cursor = after,
                        dropped = fetched - page.len(),
                        "Work source returned keys at or before the cursor"
                    );
                }
            }

            if page.is_empty() {
                break RunStatus::Completed;
            }

            for batch in Batcher::new(page, batch_size) {
                if batch_no > 0 && !self.config.dry_run && !self.config.inter_batch_delay.is_zero()
                {
                    tokio::select! {
                        biased;
                        _ = cancel_token.cancelled() => break 'pages RunStatus::Interrupted,
                        _ = tokio::time::sleep(self.config.inter_batch_delay) => {}
                    }
                }
                if cancel_token.is_cancelled() {
                    break 'pages RunStatus::Interrupted;
                }

                batch_no += 1;
                reporter.report(ProgressEvent::BatchStarted {
                    batch: batch_no,
                    size: batch.len(),
                });

                let reports = tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => break 'pages RunStatus::Interrupted,
                    reports = self.process_batch(&batch) => reports,
                };

                let reports = match reports {
                    Ok(reports) => reports,
                    Err(e) => {
                        tracing::error!(job, batch = batch_no, error = %e, "Fatal error, aborting run");
                        self.save_checkpoint(&store, &checkpoint, reporter);
                        return Err(e);
                    }
                };

                let mut batch_stats = RunStats::new();
                for report in &reports {
                    batch_stats.record(report.outcome);
                    let detail = report.detail.as_deref().unwrap_or_default();
                    match report.outcome {
                        ItemOutcome::Failed => {
                            checkpoint.record_error(&report.id, detail);
                            reporter.report(ProgressEvent::ItemFailed {
                                id: &report.id,
                                error: detail,
                            });
                        }
                        ItemOutcome::Skipped => {
                            reporter.report(ProgressEvent::ItemSkipped {
                                id: &report.id,
                                reason: detail,
                            });
                        }
                        ItemOutcome::Succeeded => {}
                    }
                }

                stats.merge(&batch_stats);
                checkpoint.record_batch(&batch_stats);
                if let Some(last) = batch.last() {
                    checkpoint.advance(last.cursor_key());
                }
                self.save_checkpoint(&store, &checkpoint, reporter);

                reporter.report(ProgressEvent::BatchCompleted {
                    batch: batch_no,
                    stats: &stats,
                    progress: tracker.snapshot(stats.processed),
                });
            }

            if exhausted {
                break RunStatus::Completed;
            }
        };

        let elapsed = tracker.elapsed();
        match status {
            RunStatus::Completed => {
                if !self.config.dry_run
                    && let Err(e) = store.clear()
                {
                    tracing::warn!(job, error = %e, "Failed to delete completed checkpoint");
                }
                reporter.report(ProgressEvent::RunCompleted {
                    job,
                    stats: &stats,
                    elapsed,
                });
            }
            RunStatus::LimitReached => {
                reporter.report(ProgressEvent::LimitReached {
                    job,
                    stats: &stats,
                    limit: self.config.limit.unwrap_or_default(),
                });
            }
            RunStatus::Interrupted => {
                if !checkpoint.is_fresh() {
                    self.save_checkpoint(&store, &checkpoint, reporter);
                }
                reporter.report(ProgressEvent::RunInterrupted {
                    job,
                    stats: &stats,
                    cursor: checkpoint.last_processed_id.as_deref(),
                });
            }
        }

        Ok(RunResult {
            status,
            stats,
            cumulative: checkpoint.stats.clone(),
            last_processed_id: checkpoint.last_processed_id.clone(),
            elapsed,
        })
    }

    /// Saves the checkpoint. Failures are reported but never abort the run.
    fn save_checkpoint<R: ProgressReporter>(
        &self,
        store: &CheckpointStore,
        checkpoint: &Checkpoint,
        reporter: &R,
    ) {
        if self.config.dry_run {
            return;
        }
        match store.save(checkpoint) {
            Ok(()) => {
                if let Some(cursor) = checkpoint.last_processed_id.as_deref() {
                    reporter.report(ProgressEvent::CheckpointSaved {
                        path: store.path(),
                        cursor,
                    });
                }
            }
            Err(e) => {
                let error = e.to_string();
                reporter.report(ProgressEvent::CheckpointFailed {
                    path: store.path(),
                    error: &error,
                });
            }
        }
    }

    /// Processes one batch. `Err` only for fatal errors.
    async fn process_batch(&self, batch: &[S::Item]) -> Result<Vec<ItemReport>, AppError> {
        let mut reports = Vec::with_capacity(batch.len());
        let mut eligible = Vec::with_capacity(batch.len());

        for item in batch {
            match self.call.check(item) {
                Ok(()) if self.config.dry_run => reports.push(ItemReport::skipped(item, "dry run")),
                Ok(()) => eligible.push(item.clone()),
                Err(e) => reports.push(ItemReport::skipped(item, e.to_string())),
            }
        }

        if eligible.is_empty() {
            return Ok(reports);
        }

        match self.call.mode() {
            CallMode::Batched => reports.extend(self.process_batched(&eligible).await?),
            CallMode::PerItem => {
                let results: Vec<Result<ItemReport, AppError>> = stream::iter(eligible.iter())
                    .map(|item| self.process_single(item))
                    .buffer_unordered(self.config.concurrency.max(1))
                    .collect()
                    .await;
                for result in results {
                    reports.push(result?);
                }
            }
        }

        Ok(reports)
    }

    /// One call for the whole batch. A call failure fails every item.
    async fn process_batched(&self, items: &[S::Item]) -> Result<Vec<ItemReport>, AppError> {
        let result = self.call_with_retry(items).await;

        let outputs = match result {
            Ok(outputs) if outputs.len() == items.len() => outputs,
            Ok(outputs) => {
                let error = format!(
                    "{} returned {} results for {} items",
                    self.call.name(),
                    outputs.len(),
                    items.len()
                );
                return Ok(items
                    .iter()
                    .map(|item| ItemReport::failed(item, error.clone()))
                    .collect());
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                let error = e.to_string();
                let permanent = e.is_permanent();
                return Ok(items
                    .iter()
                    .map(|item| {
                        if permanent {
                            ItemReport::skipped(item, error.clone())
                        } else {
                            ItemReport::failed(item, error.clone())
                        }
                    })
                    .collect());
            }
        };

        let mut reports = Vec::with_capacity(items.len());
        for (item, output) in items.iter().zip(outputs) {
            reports.push(self.write(item, output).await);
        }
        Ok(reports)
    }

    /// One call for one item. Failures are isolated to the item.
    async fn process_single(&self, item: &S::Item) -> Result<ItemReport, AppError> {
        match self.call_with_retry(std::slice::from_ref(item)).await {
            Ok(mut outputs) if outputs.len() == 1 => {
                Ok(self.write(item, outputs.pop().flatten()).await)
            }
            Ok(outputs) => Ok(ItemReport::failed(
                item,
                format!("{} returned {} results for 1 item", self.call.name(), outputs.len()),
            )),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) if e.is_permanent() => Ok(ItemReport::skipped(item, e.to_string())),
            Err(e) => Ok(ItemReport::failed(item, e.to_string())),
        }
    }

    async fn call_with_retry(
        &self,
        items: &[S::Item],
    ) -> Result<Vec<Option<C::Output>>, AppError> {
        let call = &self.call;
        let limiter = &self.limiter;
        let timeout = self.config.call_timeout;

        retry_with_backoff(&self.config.retry, call.name(), || async move {
            limiter.acquire().await;
            with_timeout(timeout, call.call(items)).await
        })
        .await
    }

    async fn write(&self, item: &S::Item, output: Option<C::Output>) -> ItemReport {
        match output {
            None => ItemReport::skipped(item, "no result from provider"),
            Some(output) => match self.writer.upsert(item, output).await {
                Ok(()) => ItemReport::succeeded(item),
                Err(e) => {
                    tracing::warn!(id = item.cursor_key(), error = %e, "Write failed");
                    ItemReport::failed(item, format!("write failed: {}", e))
                }
            },
        }
    }
}
