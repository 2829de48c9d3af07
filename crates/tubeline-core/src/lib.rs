//! Tubeline Core - Batch-Checkpoint-Resume engine for YouTube analytics backfills.
//!
//! This crate provides the reusable pieces every backfill job shares:
//!
//! - **Runner**: [`BatchRunner`] pages through pending rows, batches them, calls a
//!   provider, upserts results, and checkpoints after every batch
//! - **Jobs**: [`EmbeddingJob`], [`SummaryJob`], [`ChannelIdJob`], [`CentroidJob`]
//! - **Resilience**: [`RetryPolicy`] with linear backoff, per-call timeouts, [`RateLimiter`]
//! - **Checkpoints**: versioned JSON files via [`CheckpointStore`]
//! - **Traits**: [`WorkSource`], [`ExternalCall`], [`ResultWriter`] and the provider
//!   traits, for dependency injection
//! - **Progress reporting**: [`ProgressReporter`] trait for decoupled logging
//!
//! # Architecture
//!
//! Business logic is decoupled from I/O through traits. Concrete clients live
//! in `tubeline-client`, PostgreSQL access in `tubeline-db`, and the binary in
//! `tubeline-cli`.
//!
//! # Example
//!
//! ```ignore
//! use tubeline_core::{BatchRunner, JobKind, SummaryJob, TracingReporter};
//!
//! let config = JobKind::Summaries.default_run_config().with_limit(500);
//! let runner = BatchRunner::new(pending, SummaryJob::new(chat), repo, config);
//! let result = runner.run(&TracingReporter, cancel_token).await?;
//! ```

pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod progress;
pub mod rate_limit;
pub mod retry;
pub mod runner;
pub mod stats;
pub mod traits;

// Batching
pub use batch::{Batcher, aligned_page_size, batch_count, effective_batch_size};

// Checkpoints
pub use checkpoint::{CHECKPOINT_VERSION, Checkpoint, CheckpointStore, ItemError};

// Configuration
pub use config::{
    DbConfig, HttpConfig, JobKind, JobOverrides, RunConfig, TubelineConfig, default_config_path,
    load_config,
};

// Error handling
pub use error::{AppError, ProviderErrorDetails, ProviderErrorKind, classify_provider_error};

// Jobs
pub use jobs::{CentroidJob, ChannelIdJob, EmbeddingJob, SummaryJob, mean_vector};

// Domain models
pub use models::{
    Centroid, Embedding, Summary, TopicCluster, Video, VideoFilter, VideoMetadata, VideoPredicate,
};

// Progress reporting
pub use progress::{
    ProgressEvent, ProgressReporter, ProgressSnapshot, ProgressTracker, SilentReporter,
    TracingReporter, format_duration,
};

// Resilience
pub use rate_limit::RateLimiter;
pub use retry::{RetryPolicy, retry_with_backoff, with_timeout};

// Runner
pub use runner::BatchRunner;
pub use stats::{ItemOutcome, RunResult, RunStats, RunStatus};

// Traits for dependency injection
pub use traits::{
    CallMode, EmbeddingProvider, ExternalCall, MetadataProvider, ResultWriter, SummaryProvider,
    SummaryRequest, VectorStore, WorkItem, WorkSource,
};
