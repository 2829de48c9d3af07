//! Versioned JSON checkpoints for resumable runs.
//!
//! A checkpoint is written after every batch and deleted on clean
//! completion. Loading never fails: a missing, unreadable, malformed, or
//! mismatched file yields a fresh zero state and a warning.
//!
//! # Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "job": "summaries",
//!   "processed": 100,
//!   "successful": 75,
//!   "failed": 25,
//!   "skipped": 0,
//!   "lastProcessedId": "vid_0100",
//!   "errors": [{ "videoId": "vid_0051", "error": "Rate limit exceeded" }],
//!   "startedAt": "2026-10-19T10:00:00Z",
//!   "updatedAt": "2026-10-19T10:05:00Z"
//! }
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::stats::RunStats;

/// Current checkpoint schema version. Any other version starts fresh.
pub const CHECKPOINT_VERSION: u32 = 1;

/// A failed item recorded in the checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemError {
    pub video_id: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub version: u32,
    pub job: String,
    #[serde(flatten)]
    pub stats: RunStats,
    pub last_processed_id: Option<String>,
    #[serde(default)]
    pub errors: Vec<ItemError>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Zero state for `job`.
    pub fn new(job: &str) -> Self {
        let now = Utc::now();
        Self {
            version: CHECKPOINT_VERSION,
            job: job.to_string(),
            stats: RunStats::default(),
            last_processed_id: None,
            errors: Vec::new(),
            started_at: now,
            updated_at: now,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.last_processed_id.is_none() && self.stats.processed == 0
    }

    /// Adds a finished batch's counters to the cumulative totals.
    pub fn record_batch(&mut self, batch: &RunStats) {
        self.stats.merge(batch);
    }

    pub fn record_error(&mut self, video_id: &str, error: &str) {
        self.errors.push(ItemError {
            video_id: video_id.to_string(),
            error: error.to_string(),
        });
    }

    /// Moves the resume cursor forward to the last key of a finished batch.
    pub fn advance(&mut self, cursor: &str) {
        self.last_processed_id = Some(cursor.to_string());
        self.updated_at = Utc::now();
    }
}

/// On-disk location of a job's checkpoint.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    job: String,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>, job: &str) -> Self {
        Self {
            path: path.into(),
            job: job.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Loads the checkpoint, falling back to a zero state on any problem.
    pub fn load(&self) -> Checkpoint {
        match self.try_load() {
            Ok(Some(checkpoint)) => checkpoint,
            Ok(None) => Checkpoint::new(&self.job),
            Err(reason) => {
                tracing::warn!(
                    path = %self.path.display(),
                    reason = %reason,
                    "Ignoring checkpoint, starting fresh"
                );
                Checkpoint::new(&self.job)
            }
        }
    }

    /// Loads the checkpoint, distinguishing "absent" from "unusable".
    ///
    /// `Err` carries a human-readable reason the file was rejected.
    pub fn try_load(&self) -> Result<Option<Checkpoint>, String> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("unreadable: {}", e)),
        };

        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| format!("malformed JSON: {}", e))?;

        let version = value.get("version").and_then(|v| v.as_u64());
        if version != Some(u64::from(CHECKPOINT_VERSION)) {
            return Err(format!(
                "schema version {:?}, expected {}",
                version, CHECKPOINT_VERSION
            ));
        }

        let checkpoint: Checkpoint =
            serde_json::from_value(value).map_err(|e| format!("invalid schema: {}", e))?;

        if checkpoint.job != self.job {
            return Err(format!(
                "belongs to job '{}', expected '{}'",
                checkpoint.job, self.job
            ));
        }

        Ok(Some(checkpoint))
    }

    /// Atomically writes the checkpoint (temp file, then rename).
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::CheckpointError(format!(
                    "cannot create '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let json = serde_json::to_vec_pretty(checkpoint)?;
        let tmp = self.tmp_path();
        std::fs::write(&tmp, json).map_err(|e| {
            AppError::CheckpointError(format!("cannot write '{}': {}", tmp.display(), e))
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            AppError::CheckpointError(format!(
                "cannot move checkpoint into '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// Deletes the checkpoint. Absent files are not an error.
    pub fn clear(&self) -> Result<(), AppError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::CheckpointError(format!(
                "cannot delete '{}': {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
