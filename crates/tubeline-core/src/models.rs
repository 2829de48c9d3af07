//! Domain rows and provider outputs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::traits::WorkItem;

/// A row of the `videos` table, as selected for backfills.
///
/// The primary key is the YouTube video id, which is also the pagination
/// cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Video {
    pub id: String,
    pub channel_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub transcript: Option<String>,
    pub thumbnail_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub llm_summary: Option<String>,
}

impl Video {
    /// Minimal video with only an id and title. Handy for fixtures.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            channel_id: None,
            title: title.into(),
            description: None,
            transcript: None,
            thumbnail_url: None,
            published_at: None,
            llm_summary: None,
        }
    }

    /// `title + description (+ summary)`, or `None` when all are blank.
    pub fn embedding_text(&self) -> Option<String> {
        let parts: Vec<&str> = [
            Some(self.title.as_str()),
            self.description.as_deref(),
            self.llm_summary.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }
}

impl WorkItem for Video {
    fn cursor_key(&self) -> &str {
        &self.id
    }
}

/// A topic cluster with the ids of its member videos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TopicCluster {
    pub id: String,
    pub label: Option<String>,
    pub video_ids: Vec<String>,
}

impl WorkItem for TopicCluster {
    fn cursor_key(&self) -> &str {
        &self.id
    }
}

/// "Not yet processed" predicates for the `videos` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoPredicate {
    /// `llm_summary IS NULL`
    MissingSummary,
    /// `embedding IS NULL`
    MissingEmbedding,
    /// `channel_id IS NULL`
    MissingChannelId,
}

/// Selection of pending videos: a predicate plus an optional publish date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFilter {
    pub predicate: VideoPredicate,
    pub published_on: Option<NaiveDate>,
}

impl VideoFilter {
    pub fn new(predicate: VideoPredicate) -> Self {
        Self {
            predicate,
            published_on: None,
        }
    }

    pub fn published_on(mut self, date: Option<NaiveDate>) -> Self {
        self.published_on = date;
        self
    }
}

// =============================================================================
// Provider Outputs
// =============================================================================

/// An embedding vector for one video.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(pub Vec<f32>);

/// An LLM summary for one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub text: String,
    pub model: String,
}

/// Snippet metadata from the YouTube Data API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub id: String,
    pub channel_id: String,
    pub channel_title: Option<String>,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Mean vector of a topic cluster's members.
#[derive(Debug, Clone, PartialEq)]
pub struct Centroid {
    pub vector: Vec<f32>,
    /// Members that had a vector in the store.
    pub member_count: usize,
}
