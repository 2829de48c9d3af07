//! Tubeline CLI - argument parsing and run reporting for the `tubeline` binary.

mod config;

pub use config::{
    CheckpointAction, CheckpointArgs, Command, Config, Credentials, JobArg, RunArgs,
    resolve_run_config, version_info,
};

use tubeline_core::{RunResult, RunStatus, format_duration};

/// Exit code for a run that finished or stopped at its limit.
pub const EXIT_SUCCESS: u8 = 0;
/// Exit code for fatal errors (credentials, configuration, database, quota).
pub const EXIT_FATAL: u8 = 1;
/// Exit code after SIGINT/SIGTERM (128 + SIGINT).
pub const EXIT_INTERRUPTED: u8 = 130;

/// Maps a finished run to the process exit code.
///
/// Per-item failures do not change the exit code; they are in the summary
/// and the checkpoint error list.
pub fn exit_code(status: RunStatus) -> u8 {
    match status {
        RunStatus::Completed | RunStatus::LimitReached => EXIT_SUCCESS,
        RunStatus::Interrupted => EXIT_INTERRUPTED,
    }
}

/// Renders the end-of-run summary block.
pub fn summary_lines(job: &str, result: &RunResult, dry_run: bool) -> Vec<String> {
    let rule = "═".repeat(55);
    let mut lines = vec![
        rule.clone(),
        format!(
            "{} {}{}",
            job,
            result.status.as_str().replace('_', " "),
            if dry_run { " (dry run)" } else { "" }
        ),
        rule.clone(),
        format!("  Processed:           {}", result.stats.processed),
        format!("  ✓ Successful:        {}", result.stats.successful),
        format!("  ✗ Failed:            {}", result.stats.failed),
        format!("  - Skipped:           {}", result.stats.skipped),
        format!("  Elapsed:             {}", format_duration(result.elapsed)),
    ];

    if result.cumulative != result.stats {
        lines.push("─".repeat(55));
        lines.push(format!(
            "  Including resumed:   {} processed, {} failed",
            result.cumulative.processed, result.cumulative.failed
        ));
    }

    match result.status {
        RunStatus::Completed => {}
        RunStatus::LimitReached | RunStatus::Interrupted => {
            if let Some(cursor) = &result.last_processed_id {
                lines.push(format!("  Resume after:        {}", cursor));
            }
        }
    }
    lines.push(rule);
    lines
}
