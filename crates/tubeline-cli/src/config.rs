use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tubeline_core::{AppError, JobKind, RateLimiter, RunConfig, TubelineConfig};

static VERSION_INFO: LazyLock<String> = LazyLock::new(|| {
    let version = env!("CARGO_PKG_VERSION");

    let commit = option_env!("VERGEN_GIT_SHA")
        .map(|s| s.chars().take(7).collect::<String>())
        .unwrap_or_else(|| "unknown".to_string());

    let built = option_env!("VERGEN_BUILD_DATE").unwrap_or("unknown"); // YYYY-MM-DD
    let target = option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown");
    let rustc = option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown");

    format!("{version}\ncommit: {commit}\nbuilt: {built}\ntarget: {target}\nrustc: {rustc}")
});

pub fn version_info() -> &'static str {
    &VERSION_INFO
}

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "tubeline")]
#[command(
    author,
    version = version_info(),
    about = "Resumable batch backfills for a YouTube analytics datastore"
)]
#[command(after_help = "Examples:
  tubeline summaries --limit 500
  tubeline embeddings --date 2026-10-01 --dry-run
  tubeline channel-ids --fresh
  tubeline checkpoint show summaries

Interrupt with Ctrl+C at any time: the last completed batch is checkpointed
and the next run resumes after it.")]
pub struct Config {
    /// PostgreSQL database connection URL
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// OpenAI API key (embeddings, summaries)
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// YouTube Data API key (channel-ids)
    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true)]
    pub youtube_api_key: Option<String>,

    /// Pinecone API key (centroids)
    #[arg(long, env = "PINECONE_API_KEY", hide_env_values = true)]
    pub pinecone_api_key: Option<String>,

    /// Pinecone index host, e.g. videos-abc123.svc.pinecone.io (centroids)
    #[arg(long, env = "PINECONE_INDEX_HOST")]
    pub pinecone_index_host: Option<String>,

    /// Pinecone namespace holding video vectors
    #[arg(long, env = "PINECONE_NAMESPACE")]
    pub pinecone_namespace: Option<String>,

    /// Embedding model name
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    pub embedding_model: String,

    /// Chat model used for summaries
    #[arg(long, env = "SUMMARY_MODEL", default_value = "gpt-4o-mini")]
    pub summary_model: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Embed title and description for videos without an embedding
    Embeddings(RunArgs),
    /// Generate LLM summaries for videos without one
    Summaries(RunArgs),
    /// Look up channel ids on the YouTube Data API
    ChannelIds(RunArgs),
    /// Compute topic cluster centroids from member video vectors
    Centroids(RunArgs),
    /// Inspect or delete a job's checkpoint
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
}

impl Command {
    /// The job and its arguments, for the backfill subcommands.
    pub fn job(&self) -> Option<(JobKind, &RunArgs)> {
        match self {
            Command::Embeddings(args) => Some((JobKind::Embeddings, args)),
            Command::Summaries(args) => Some((JobKind::Summaries, args)),
            Command::ChannelIds(args) => Some((JobKind::ChannelIds, args)),
            Command::Centroids(args) => Some((JobKind::Centroids, args)),
            Command::Checkpoint { .. } => None,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum CheckpointAction {
    /// Print the checkpoint as JSON
    Show(CheckpointArgs),
    /// Delete the checkpoint so the next run starts from the beginning
    Clear(CheckpointArgs),
}

#[derive(Args, Debug)]
pub struct CheckpointArgs {
    pub job: JobArg,

    /// Checkpoint file, overriding the configured directory
    #[arg(long, value_name = "PATH")]
    pub checkpoint: Option<PathBuf>,

    /// Custom path to tubeline.toml
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Job names accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum JobArg {
    Embeddings,
    Summaries,
    ChannelIds,
    Centroids,
}

impl From<JobArg> for JobKind {
    fn from(job: JobArg) -> Self {
        match job {
            JobArg::Embeddings => JobKind::Embeddings,
            JobArg::Summaries => JobKind::Summaries,
            JobArg::ChannelIds => JobKind::ChannelIds,
            JobArg::Centroids => JobKind::Centroids,
        }
    }
}

/// Flags shared by every backfill subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Select and report pending rows without calling providers or writing
    #[arg(long)]
    pub dry_run: bool,

    /// Stop after processing N items
    #[arg(short, long, value_name = "N")]
    pub limit: Option<usize>,

    /// Only videos published on this UTC date
    #[arg(long, value_name = "YYYY-MM-DD", value_parser = parse_date)]
    pub date: Option<NaiveDate>,

    /// Items per provider call (clamped to the provider limit)
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Concurrent requests within a batch (per-item jobs)
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Pause between batches in milliseconds
    #[arg(long, value_name = "MS")]
    pub delay_ms: Option<u64>,

    /// Maximum provider requests per minute (0 for no limit)
    #[arg(long, value_name = "N")]
    pub rpm: Option<u32>,

    /// Checkpoint file, overriding the configured directory
    #[arg(long, value_name = "PATH")]
    pub checkpoint: Option<PathBuf>,

    /// Ignore any existing checkpoint and start from the beginning
    #[arg(long)]
    pub fresh: bool,

    /// Custom path to tubeline.toml
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl RunArgs {
    /// Applies CLI flags on top of the file-derived configuration.
    pub fn apply(&self, mut config: RunConfig) -> RunConfig {
        if let Some(size) = self.batch_size {
            config = config.with_batch_size(size);
        }
        if let Some(concurrency) = self.concurrency {
            config = config.with_concurrency(concurrency);
        }
        if let Some(ms) = self.delay_ms {
            config = config.with_inter_batch_delay(Duration::from_millis(ms));
        }
        if let Some(rpm) = self.rpm {
            config = config.with_min_call_interval(RateLimiter::per_minute(rpm).min_interval());
        }
        if let Some(path) = &self.checkpoint {
            config = config.with_checkpoint_path(path);
        }
        if let Some(limit) = self.limit {
            config = config.with_limit(limit);
        }
        if self.dry_run {
            config = config.with_dry_run();
        }
        if self.fresh {
            config = config.with_fresh_start();
        }
        config
    }
}

/// Resolves the effective run configuration: built-ins, then the config
/// file, then CLI flags.
pub fn resolve_run_config(
    job: JobKind,
    file: Option<&TubelineConfig>,
    args: &RunArgs,
) -> RunConfig {
    let base = match file {
        Some(file) => file.run_config_for(job),
        None => job.default_run_config(),
    };
    args.apply(base)
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    tubeline_db::parse_publish_date(value).map_err(|e| e.to_string())
}

// =============================================================================
// Credentials
// =============================================================================

/// Credentials and endpoints resolved for one job.
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    pub database_url: &'a str,
    pub provider_key: &'a str,
    /// Pinecone index host (centroids only).
    pub index_host: Option<&'a str>,
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, AppError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(AppError::MissingCredential(name))
}

impl Config {
    /// Checks every credential `job` needs before any work starts.
    pub fn credentials_for(&self, job: JobKind) -> Result<Credentials<'_>, AppError> {
        let database_url = required(&self.database_url, "DATABASE_URL")?;
        let (provider_key, index_host) = match job {
            JobKind::Embeddings | JobKind::Summaries => {
                (required(&self.openai_api_key, "OPENAI_API_KEY")?, None)
            }
            JobKind::ChannelIds => (required(&self.youtube_api_key, "YOUTUBE_API_KEY")?, None),
            JobKind::Centroids => (
                required(&self.pinecone_api_key, "PINECONE_API_KEY")?,
                Some(required(&self.pinecone_index_host, "PINECONE_INDEX_HOST")?),
            ),
        };
        Ok(Credentials {
            database_url,
            provider_key,
            index_host,
        })
    }
}
