//! Configuration types for tubeline components.
//!
//! Configuration is layered. Each layer overrides the one before it:
//!
//! 1. built-in per-job defaults ([`JobKind::default_run_config`])
//! 2. the `[defaults]` table of `tubeline.toml`
//! 3. the `[jobs.<name>]` table of `tubeline.toml`
//! 4. CLI flags / environment variables (applied by the binary)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;
use crate::retry::RetryPolicy;

/// Database connection pool configuration.
pub struct DbConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP client configuration for external API calls.
///
/// The client-level timeout is a backstop; each call is additionally bounded
/// by [`RunConfig::call_timeout`].
pub struct HttpConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

// =============================================================================
// Jobs
// =============================================================================

/// The recurring backfill jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Embed `title + description` for videos without an embedding.
    Embeddings,
    /// LLM summaries for videos without `llm_summary`.
    Summaries,
    /// YouTube Data API lookup for videos without `channel_id`.
    ChannelIds,
    /// Topic cluster centroids from member video vectors.
    Centroids,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::Embeddings,
        JobKind::Summaries,
        JobKind::ChannelIds,
        JobKind::Centroids,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Embeddings => "embeddings",
            JobKind::Summaries => "summaries",
            JobKind::ChannelIds => "channel-ids",
            JobKind::Centroids => "centroids",
        }
    }

    /// Built-in configuration tuned to each provider's quota.
    pub fn default_run_config(&self) -> RunConfig {
        let base = RunConfig::default();
        match self {
            JobKind::Embeddings => base
                .with_batch_size(100)
                .with_concurrency(1)
                .with_inter_batch_delay(Duration::from_millis(200)),
            JobKind::Summaries => base
                .with_batch_size(10)
                .with_concurrency(5)
                .with_inter_batch_delay(Duration::from_secs(1))
                .with_call_timeout(Duration::from_secs(90)),
            JobKind::ChannelIds => base
                .with_batch_size(50)
                .with_concurrency(1)
                .with_inter_batch_delay(Duration::from_millis(100)),
            JobKind::Centroids => base
                .with_batch_size(10)
                .with_concurrency(2)
                .with_inter_batch_delay(Duration::ZERO),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "embeddings" => Ok(JobKind::Embeddings),
            "summaries" => Ok(JobKind::Summaries),
            "channel-ids" => Ok(JobKind::ChannelIds),
            "centroids" => Ok(JobKind::Centroids),
            _ => Err(AppError::ConfigError(format!(
                "Unknown job: '{}'. Valid options: embeddings, summaries, channel-ids, centroids",
                s
            ))),
        }
    }
}

// =============================================================================
// Run Configuration
// =============================================================================

/// Default directory for checkpoint files, relative to the working directory.
pub const DEFAULT_CHECKPOINT_DIR: &str = ".tubeline";

/// Configuration for a single batch-checkpoint-resume run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Items per external call batch. Clamped to the provider limit at run time.
    pub batch_size: usize,
    /// Rows fetched from the work source per page.
    pub page_size: usize,
    /// Concurrent calls within a batch (per-item jobs only).
    pub concurrency: usize,
    /// Fixed pause between batches.
    pub inter_batch_delay: Duration,
    /// Minimum spacing between successive external calls.
    pub min_call_interval: Duration,
    /// Retry policy for retryable call failures.
    pub retry: RetryPolicy,
    /// Upper bound on a single external call.
    pub call_timeout: Duration,
    /// Directory holding `<job>.checkpoint.json` files.
    pub checkpoint_dir: PathBuf,
    /// Explicit checkpoint file, overriding `checkpoint_dir`.
    pub checkpoint_path: Option<PathBuf>,
    /// Select and report, but never call providers or write.
    pub dry_run: bool,
    /// Stop after this many items.
    pub limit: Option<usize>,
    /// Ignore any existing checkpoint.
    pub fresh: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            page_size: 500,
            concurrency: 5,
            inter_batch_delay: Duration::from_millis(500),
            min_call_interval: Duration::ZERO,
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(60),
            checkpoint_dir: PathBuf::from(DEFAULT_CHECKPOINT_DIR),
            checkpoint_path: None,
            dry_run: false,
            limit: None,
            fresh: false,
        }
    }
}

impl RunConfig {
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_inter_batch_delay(mut self, delay: Duration) -> Self {
        self.inter_batch_delay = delay;
        self
    }

    pub fn with_min_call_interval(mut self, interval: Duration) -> Self {
        self.min_call_interval = interval;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = dir.into();
        self
    }

    pub fn with_checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = Some(path.into());
        self
    }

    pub fn with_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_fresh_start(mut self) -> Self {
        self.fresh = true;
        self
    }

    /// Resolves the checkpoint file for a job.
    ///
    /// An explicit `checkpoint_path` wins; otherwise
    /// `<checkpoint_dir>/<job>.checkpoint.json`.
    pub fn checkpoint_path_for(&self, job: &str) -> PathBuf {
        match &self.checkpoint_path {
            Some(path) => path.clone(),
            None => self.checkpoint_dir.join(format!("{}.checkpoint.json", job)),
        }
    }

    /// Applies a table of overrides from `tubeline.toml`.
    pub fn apply(mut self, overrides: &JobOverrides) -> Self {
        if let Some(v) = overrides.batch_size {
            self = self.with_batch_size(v);
        }
        if let Some(v) = overrides.page_size {
            self = self.with_page_size(v);
        }
        if let Some(v) = overrides.concurrency {
            self = self.with_concurrency(v);
        }
        if let Some(v) = overrides.delay_ms {
            self.inter_batch_delay = Duration::from_millis(v);
        }
        if let Some(v) = overrides.min_call_interval_ms {
            self.min_call_interval = Duration::from_millis(v);
        }
        if let Some(v) = overrides.max_attempts {
            self.retry.max_attempts = v.max(1);
        }
        if let Some(v) = overrides.retry_base_delay_ms {
            self.retry.base_delay = Duration::from_millis(v);
        }
        if let Some(v) = overrides.call_timeout_secs {
            self.call_timeout = Duration::from_secs(v);
        }
        if let Some(dir) = &overrides.checkpoint_dir {
            self.checkpoint_dir = dir.clone();
        }
        self
    }
}

// =============================================================================
// Configuration File (tubeline.toml)
// =============================================================================

/// Optional per-setting overrides.
///
/// Used both for the `[defaults]` table and each `[jobs.<name>]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobOverrides {
    pub batch_size: Option<usize>,
    pub page_size: Option<usize>,
    pub concurrency: Option<usize>,
    pub delay_ms: Option<u64>,
    pub min_call_interval_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub call_timeout_secs: Option<u64>,
    pub checkpoint_dir: Option<PathBuf>,
}

/// Root structure of `tubeline.toml`.
///
/// # Example
///
/// ```toml
/// [defaults]
/// max_attempts = 5
/// checkpoint_dir = "/var/lib/tubeline"
///
/// [jobs.summaries]
/// concurrency = 3
/// delay_ms = 2000
///
/// [jobs.channel-ids]
/// batch_size = 50
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TubelineConfig {
    #[serde(default)]
    pub defaults: JobOverrides,
    #[serde(default)]
    pub jobs: HashMap<String, JobOverrides>,
}

impl TubelineConfig {
    /// Builds the run configuration for `job`: built-ins, then `[defaults]`,
    /// then `[jobs.<job>]`.
    pub fn run_config_for(&self, job: JobKind) -> RunConfig {
        let mut config = job.default_run_config().apply(&self.defaults);
        if let Some(overrides) = self.jobs.get(job.as_str()) {
            config = config.apply(overrides);
        }
        config
    }

    /// Rejects `[jobs.<name>]` tables that name no known job.
    pub fn validate(&self) -> Result<(), AppError> {
        for name in self.jobs.keys() {
            name.parse::<JobKind>()?;
        }
        Ok(())
    }
}

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "tubeline.toml";

/// Returns the default configuration directory path: `~/.config/tubeline/`
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tubeline"))
}

/// Returns the default configuration file path: `~/.config/tubeline/tubeline.toml`
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join(CONFIG_FILE_NAME))
}

/// Load `tubeline.toml`.
///
/// # Returns
/// * `Ok(Some(config))` - Configuration loaded successfully
/// * `Ok(None)` - No file at the default path (built-in defaults apply)
/// * `Err(e)` - An explicit path is missing, or the file is invalid
pub fn load_config(path: Option<PathBuf>) -> Result<Option<TubelineConfig>, AppError> {
    let explicit = path.is_some();
    let config_path = match path.or_else(default_config_path) {
        Some(p) => p,
        None => return Ok(None),
    };

    if !config_path.exists() {
        if explicit {
            return Err(AppError::ConfigError(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }
        tracing::debug!(path = %config_path.display(), "No config file, using built-in defaults");
        return Ok(None);
    }

    read_config(&config_path).map(Some)
}

fn read_config(path: &Path) -> Result<TubelineConfig, AppError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        AppError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let config: TubelineConfig = toml::from_str(&content).map_err(|e| {
        AppError::ConfigError(format!("Invalid TOML in '{}': {}", path.display(), e))
    })?;
    config.validate()?;

    Ok(config)
}
