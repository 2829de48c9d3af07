use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tubeline_cli::{
    CheckpointAction, CheckpointArgs, Command, Config, EXIT_FATAL, EXIT_INTERRUPTED, EXIT_SUCCESS,
    RunArgs, exit_code, resolve_run_config, summary_lines,
};
use tubeline_client::{ChatClient, OpenAIClient, PineconeClient, YouTubeClient};
use tubeline_core::{
    AppError, BatchRunner, CentroidJob, ChannelIdJob, CheckpointStore, DbConfig, EmbeddingJob,
    EmbeddingProvider, ExternalCall, HttpConfig, JobKind, ResultWriter, RunConfig, RunResult,
    RunStatus, SummaryJob, TracingReporter, VideoFilter, VideoPredicate, WorkSource, load_config,
};
use tubeline_db::{EMBEDDING_DIMENSION, PendingClusters, PendingVideos, VideoRepository};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    if let Err(e) = init_tracing() {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(EXIT_FATAL);
    }

    let config = Config::parse();

    match run(config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            match e.downcast_ref::<AppError>() {
                Some(app_err) => error!("{}", app_err.user_message()),
                None => error!("{:#}", e),
            }
            ExitCode::from(EXIT_FATAL)
        }
    }
}

/// Logs to stderr, level from `RUST_LOG` (default `info`).
fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn run(config: Config) -> anyhow::Result<u8> {
    let (job, args) = match &config.command {
        Command::Checkpoint { action } => {
            handle_checkpoint(action)?;
            return Ok(EXIT_SUCCESS);
        }
        other => other
            .job()
            .ok_or_else(|| anyhow::anyhow!("not a backfill command"))?,
    };

    // Fatal configuration is checked before connecting to anything
    let credentials = config.credentials_for(job)?;
    let file_config = load_config(args.config.clone())?;
    let run_config = resolve_run_config(job, file_config.as_ref(), args);

    if args.date.is_some() && job == JobKind::Centroids {
        warn!("--date is ignored for the centroids job");
    }

    info!("Connecting to database...");
    let db_config = DbConfig::default();
    let pool = PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .acquire_timeout(db_config.acquire_timeout)
        .connect(credentials.database_url)
        .await
        .map_err(AppError::DatabaseError)
        .context("Failed to connect to database")?;
    let repo = VideoRepository::new(pool);

    let shutdown_token = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown_token.clone()));

    // Client-level timeout stays above the per-call timeout so the runner's
    // timeout is the one that fires
    let http = HttpConfig {
        timeout: run_config.call_timeout + Duration::from_secs(5),
        ..HttpConfig::default()
    };

    let videos = |predicate: VideoPredicate| {
        PendingVideos::new(
            repo.clone(),
            VideoFilter::new(predicate).published_on(args.date),
        )
    };

    let dry_run = run_config.dry_run;
    let result = match job {
        JobKind::Embeddings => {
            let client = OpenAIClient::with_config(
                credentials.provider_key,
                &config.embedding_model,
                None,
                &http,
            )?;
            if client.dimension() != EMBEDDING_DIMENSION {
                return Err(AppError::ConfigError(format!(
                    "{} produces {}-dimensional embeddings, the database expects {}",
                    config.embedding_model,
                    client.dimension(),
                    EMBEDDING_DIMENSION
                ))
                .into());
            }
            run_job(
                videos(VideoPredicate::MissingEmbedding),
                EmbeddingJob::new(client),
                repo.clone(),
                run_config,
                shutdown_token,
            )
            .await?
        }
        JobKind::Summaries => {
            let client = ChatClient::with_config(
                credentials.provider_key,
                &config.summary_model,
                None,
                &http,
            )?;
            run_job(
                videos(VideoPredicate::MissingSummary),
                SummaryJob::new(client),
                repo.clone(),
                run_config,
                shutdown_token,
            )
            .await?
        }
        JobKind::ChannelIds => {
            let client = YouTubeClient::with_config(credentials.provider_key, None, &http)?;
            run_job(
                videos(VideoPredicate::MissingChannelId),
                ChannelIdJob::new(client),
                repo.clone(),
                run_config,
                shutdown_token,
            )
            .await?
        }
        JobKind::Centroids => {
            let host = credentials
                .index_host
                .ok_or(AppError::MissingCredential("PINECONE_INDEX_HOST"))?;
            let mut client = PineconeClient::with_config(credentials.provider_key, host, &http)?;
            if let Some(namespace) = &config.pinecone_namespace {
                client = client.with_namespace(namespace.as_str());
            }
            run_job(
                PendingClusters::new(repo.clone()),
                CentroidJob::new(client),
                repo.clone(),
                run_config,
                shutdown_token,
            )
            .await?
        }
    };

    for line in summary_lines(job.as_str(), &result, dry_run) {
        info!("{}", line);
    }
    if result.stats.failed > 0 && result.status != RunStatus::Completed {
        info!(
            "Failed items are listed in the checkpoint: tubeline checkpoint show {}",
            job
        );
    }

    Ok(exit_code(result.status))
}

/// Runs one job with the tracing reporter.
async fn run_job<S, C>(
    source: S,
    call: C,
    repo: VideoRepository,
    config: RunConfig,
    shutdown_token: CancellationToken,
) -> Result<RunResult, AppError>
where
    S: WorkSource,
    C: ExternalCall<Item = S::Item>,
    VideoRepository: ResultWriter<S::Item, C::Output>,
{
    let job = call.name();
    let runner = BatchRunner::new(source, call, repo, config);
    info!(job, batch_size = runner.batch_size(), "Starting backfill");
    runner.run(&TracingReporter, shutdown_token).await
}

fn handle_checkpoint(action: &CheckpointAction) -> anyhow::Result<()> {
    let (args, clear): (&CheckpointArgs, bool) = match action {
        CheckpointAction::Show(args) => (args, false),
        CheckpointAction::Clear(args) => (args, true),
    };

    let job = JobKind::from(args.job);
    let file_config = load_config(args.config.clone())?;
    let run_args = RunArgs {
        checkpoint: args.checkpoint.clone(),
        ..RunArgs::default()
    };
    let path =
        resolve_run_config(job, file_config.as_ref(), &run_args).checkpoint_path_for(job.as_str());
    let store = CheckpointStore::new(&path, job.as_str());

    if clear {
        if !store.exists() {
            info!("No checkpoint at {}", path.display());
            return Ok(());
        }
        store.clear()?;
        info!("Deleted checkpoint {}", path.display());
        return Ok(());
    }

    match store.try_load() {
        Ok(Some(checkpoint)) => {
            println!("{}", serde_json::to_string_pretty(&checkpoint)?);
        }
        Ok(None) => info!("No checkpoint at {}", path.display()),
        Err(reason) => warn!(
            "Checkpoint {} is unusable ({}); the next run starts fresh",
            path.display(),
            reason
        ),
    }
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM and cancels the run.
///
/// The runner saves its checkpoint and returns. A second signal exits
/// immediately.
async fn shutdown_signal(shutdown_token: CancellationToken) {
    wait_for_signal().await;
    info!("Shutdown signal received, saving checkpoint...");
    shutdown_token.cancel();

    wait_for_signal().await;
    warn!("Second signal received, exiting without waiting");
    std::process::exit(i32::from(EXIT_INTERRUPTED));
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
