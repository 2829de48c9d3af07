//! YouTube Data API v3 client (`videos.list`).
//!
//! Used to backfill `channel_id` and refresh snippet fields. One request
//! looks up at most 50 ids and costs one quota unit.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tubeline_core::batch::YOUTUBE_VIDEOS_LIST_LIMIT;
use tubeline_core::error::AppError;
use tubeline_core::traits::MetadataProvider;
use tubeline_core::{HttpConfig, VideoMetadata};

use crate::http::{build_client, error_from_response, map_send_error};

pub const DEFAULT_YOUTUBE_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

#[derive(Clone)]
pub struct YouTubeClient {
    client: Client,
    api_key: String,
    base_url: String,
    timeout_secs: u64,
}

#[derive(Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoResource>,
}

#[derive(Deserialize)]
struct VideoResource {
    id: String,
    snippet: Option<Snippet>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    channel_id: String,
    channel_title: Option<String>,
    title: String,
    published_at: Option<DateTime<Utc>>,
}

impl YouTubeClient {
    pub fn new(api_key: &str) -> Result<Self, AppError> {
        Self::with_config(api_key, None, &HttpConfig::default())
    }

    pub fn with_config(
        api_key: &str,
        base_url: Option<&str>,
        http: &HttpConfig,
    ) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(http)?,
            api_key: api_key.to_string(),
            base_url: base_url
                .unwrap_or(DEFAULT_YOUTUBE_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            timeout_secs: http.timeout.as_secs(),
        })
    }

    /// Looks up snippet metadata for up to 50 video ids.
    ///
    /// Deleted, private or unknown ids are absent from the result.
    pub async fn list_videos(&self, ids: &[String]) -> Result<Vec<VideoMetadata>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        if ids.len() > YOUTUBE_VIDEOS_LIST_LIMIT {
            return Err(AppError::ClientError(format!(
                "videos.list accepts at most {} ids, got {}",
                YOUTUBE_VIDEOS_LIST_LIMIT,
                ids.len()
            )));
        }

        let joined = ids.join(",");
        let max_results = ids.len().to_string();
        let response = self
            .client
            .get(format!("{}/videos", self.base_url))
            .query(&[
                ("part", "snippet"),
                ("id", joined.as_str()),
                ("maxResults", max_results.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| map_send_error("youtube", self.timeout_secs, e))?;

        if !response.status().is_success() {
            return Err(error_from_response("youtube", response).await);
        }

        let list: VideoListResponse = response.json().await.map_err(|e| {
            AppError::ClientError(format!("Failed to parse YouTube response: {}", e))
        })?;

        let metadata: Vec<VideoMetadata> = list
            .items
            .into_iter()
            .filter_map(|item| {
                let snippet = item.snippet?;
                Some(VideoMetadata {
                    id: item.id,
                    channel_id: snippet.channel_id,
                    channel_title: snippet.channel_title,
                    title: snippet.title,
                    published_at: snippet.published_at,
                })
            })
            .collect();

        if metadata.len() < ids.len() {
            tracing::debug!(
                requested = ids.len(),
                found = metadata.len(),
                "Some videos are no longer available on YouTube"
            );
        }

        Ok(metadata)
    }
}

// =============================================================================
// Trait Implementation: MetadataProvider
// =============================================================================

impl MetadataProvider for YouTubeClient {
    fn name(&self) -> &'static str {
        "youtube"
    }

    async fn fetch_metadata(&self, ids: &[String]) -> Result<Vec<VideoMetadata>, AppError> {
        self.list_videos(ids).await
    }
}
