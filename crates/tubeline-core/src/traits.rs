//! Trait definitions for external dependencies.
//!
//! The batch runner and the job adapters depend only on these traits.
//! Concrete clients are built once in `main` and injected, so tests can run
//! every component against in-memory fakes.
//!
//! - [`WorkSource`] / [`ResultWriter`]: the datastore (e.g. PostgreSQL)
//! - [`ExternalCall`]: one network step of a job, batched or per item
//! - [`EmbeddingProvider`], [`SummaryProvider`], [`MetadataProvider`],
//!   [`VectorStore`]: the provider APIs the jobs call
//!
//! # Example
//!
//! ```ignore
//! use tubeline_core::{BatchRunner, RunConfig, TracingReporter};
//!
//! let runner = BatchRunner::new(source, job, writer, RunConfig::default());
//! let result = runner.run(&TracingReporter, cancel_token).await?;
//! ```

use std::collections::HashMap;
use std::future::Future;

use crate::AppError;
use crate::models::VideoMetadata;

/// An item the runner can paginate over.
pub trait WorkItem: Send + Sync + Clone + 'static {
    /// Strictly increasing, unique pagination key (the primary key).
    fn cursor_key(&self) -> &str;
}

/// Paginated selector over "not yet processed" rows.
///
/// Implementations must order by the cursor key and return only rows whose
/// key is strictly greater than `after` (keyset pagination).
pub trait WorkSource: Send + Sync + Clone {
    type Item: WorkItem;

    /// Returns up to `page_size` pending items with a key greater than `after`.
    fn next_page(
        &self,
        after: Option<&str>,
        page_size: usize,
    ) -> impl Future<Output = Result<Vec<Self::Item>, AppError>> + Send;

    /// Counts pending items with a key greater than `after`, if supported.
    ///
    /// Used only for ETA reporting. The default reports "unknown".
    fn count_pending(
        &self,
        after: Option<&str>,
    ) -> impl Future<Output = Result<Option<u64>, AppError>> + Send {
        let _ = after;
        async { Ok(None) }
    }
}

/// How the runner issues calls for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    /// One request carries the whole batch. A failure fails every item.
    Batched,
    /// One request per item, fanned out concurrently. Failures are isolated.
    PerItem,
}

/// One external network step of a job.
pub trait ExternalCall: Send + Sync + Clone {
    type Item: WorkItem;
    type Output: Send + 'static;

    /// Short job name used in logs and checkpoint files.
    fn name(&self) -> &'static str;

    /// Provider hard limit on items per call.
    fn max_batch_size(&self) -> usize;

    fn mode(&self) -> CallMode;

    /// Pre-flight check. An error marks the item skipped without a call.
    fn check(&self, item: &Self::Item) -> Result<(), AppError> {
        let _ = item;
        Ok(())
    }

    /// Calls the provider for `items`.
    ///
    /// Returns one entry per input, in input order. `None` means the
    /// provider had no result for that item (e.g. a deleted video), which
    /// the runner records as skipped.
    fn call(
        &self,
        items: &[Self::Item],
    ) -> impl Future<Output = Result<Vec<Option<Self::Output>>, AppError>> + Send;
}

/// Idempotent persistence of one call result, keyed by the item's id.
pub trait ResultWriter<I, O>: Send + Sync + Clone {
    /// Inserts or updates the result for `item`. Writing the same result
    /// twice leaves the same final state as writing it once.
    fn upsert(&self, item: &I, output: O) -> impl Future<Output = Result<(), AppError>> + Send;
}

// =============================================================================
// Provider Traits
// =============================================================================

/// Provider for generating text embeddings.
pub trait EmbeddingProvider: Send + Sync + Clone {
    /// Returns the provider name for logging.
    fn name(&self) -> &'static str;

    /// Returns the embedding dimension.
    fn dimension(&self) -> usize;

    /// Maximum number of texts per request.
    fn max_batch_size(&self) -> usize {
        crate::batch::OPENAI_EMBEDDING_BATCH_LIMIT
    }

    /// Generates embeddings for multiple texts in one request, in input order.
    fn generate_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, AppError>> + Send;
}

/// Input for a single video summary.
#[derive(Debug, Clone, Copy)]
pub struct SummaryRequest<'a> {
    pub video_id: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub transcript: Option<&'a str>,
    pub thumbnail_url: Option<&'a str>,
}

/// LLM chat provider producing video summaries.
pub trait SummaryProvider: Send + Sync + Clone {
    fn name(&self) -> &'static str;

    /// Model identifier stored alongside each summary.
    fn model(&self) -> &str;

    /// Whether thumbnails can be attached as image input.
    fn supports_images(&self) -> bool {
        false
    }

    fn summarize(
        &self,
        request: SummaryRequest<'_>,
    ) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Video metadata lookup (YouTube Data API `videos.list`).
pub trait MetadataProvider: Send + Sync + Clone {
    fn name(&self) -> &'static str;

    /// Maximum ids per request.
    fn max_batch_size(&self) -> usize {
        crate::batch::YOUTUBE_VIDEOS_LIST_LIMIT
    }

    /// Fetches metadata for `ids`. Unknown or deleted ids are simply absent
    /// from the result.
    fn fetch_metadata(
        &self,
        ids: &[String],
    ) -> impl Future<Output = Result<Vec<VideoMetadata>, AppError>> + Send;
}

/// ID-based vector fetch from a vector database.
pub trait VectorStore: Send + Sync + Clone {
    fn name(&self) -> &'static str;

    /// Maximum ids per fetch request.
    fn max_fetch_size(&self) -> usize {
        crate::batch::VECTOR_FETCH_LIMIT
    }

    /// Fetches stored vectors by id. Missing ids are absent from the map.
    fn fetch_vectors(
        &self,
        ids: &[String],
    ) -> impl Future<Output = Result<HashMap<String, Vec<f32>>, AppError>> + Send;
}
