//! Job adapters: each recurring backfill as an [`ExternalCall`].
//!
//! | job | item | call | mode |
//! |---|---|---|---|
//! | [`EmbeddingJob`] | [`Video`] | embeddings over title/description/summary | batched |
//! | [`SummaryJob`] | [`Video`] | chat completion, optional thumbnail | per item |
//! | [`ChannelIdJob`] | [`Video`] | YouTube `videos.list` | batched |
//! | [`CentroidJob`] | [`TopicCluster`] | vector fetch + mean | per item |

use std::collections::HashMap;

use crate::AppError;
use crate::batch::{
    CENTROID_CLUSTER_BATCH_LIMIT, VISION_CHAT_BATCH_LIMIT, YOUTUBE_VIDEOS_LIST_LIMIT,
};
use crate::models::{Centroid, Embedding, Summary, TopicCluster, Video, VideoMetadata};
use crate::traits::{
    CallMode, EmbeddingProvider, ExternalCall, MetadataProvider, SummaryProvider, SummaryRequest,
    VectorStore,
};

/// Transcripts are cut to this many characters before summarization.
pub const TRANSCRIPT_CHAR_LIMIT: usize = 12_000;

fn invalid(id: &str, reason: &str) -> AppError {
    AppError::InvalidInput {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Truncates `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// =============================================================================
// Embeddings
// =============================================================================

#[derive(Clone)]
pub struct EmbeddingJob<E> {
    provider: E,
}

impl<E: EmbeddingProvider> EmbeddingJob<E> {
    pub fn new(provider: E) -> Self {
        Self { provider }
    }
}

impl<E: EmbeddingProvider> ExternalCall for EmbeddingJob<E> {
    type Item = Video;
    type Output = Embedding;

    fn name(&self) -> &'static str {
        "embeddings"
    }

    fn max_batch_size(&self) -> usize {
        self.provider.max_batch_size()
    }

    fn mode(&self) -> CallMode {
        CallMode::Batched
    }

    fn check(&self, video: &Video) -> Result<(), AppError> {
        match video.embedding_text() {
            Some(_) => Ok(()),
            None => Err(invalid(&video.id, "no text to embed")),
        }
    }

    async fn call(&self, videos: &[Video]) -> Result<Vec<Option<Embedding>>, AppError> {
        let texts: Vec<String> = videos
            .iter()
            .map(|v| v.embedding_text().unwrap_or_default())
            .collect();

        let vectors = self.provider.generate_batch(&texts).await?;
        let dimension = self.provider.dimension();

        vectors
            .into_iter()
            .zip(videos)
            .map(|(vector, video)| {
                if vector.len() != dimension {
                    return Err(AppError::ClientError(format!(
                        "{} returned a {}-dimensional embedding for {}, expected {}",
                        self.provider.name(),
                        vector.len(),
                        video.id,
                        dimension
                    )));
                }
                Ok(Some(Embedding(vector)))
            })
            .collect()
    }
}

// =============================================================================
// Summaries
// =============================================================================

#[derive(Clone)]
pub struct SummaryJob<P> {
    provider: P,
}

impl<P: SummaryProvider> SummaryJob<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P: SummaryProvider> ExternalCall for SummaryJob<P> {
    type Item = Video;
    type Output = Summary;

    fn name(&self) -> &'static str {
        "summaries"
    }

    fn max_batch_size(&self) -> usize {
        VISION_CHAT_BATCH_LIMIT
    }

    fn mode(&self) -> CallMode {
        CallMode::PerItem
    }

    fn check(&self, video: &Video) -> Result<(), AppError> {
        if non_blank(video.transcript.as_deref()).is_none()
            && non_blank(video.description.as_deref()).is_none()
        {
            return Err(invalid(&video.id, "no transcript or description"));
        }
        Ok(())
    }

    async fn call(&self, videos: &[Video]) -> Result<Vec<Option<Summary>>, AppError> {
        let mut summaries = Vec::with_capacity(videos.len());

        for video in videos {
            let thumbnail_url = if self.provider.supports_images() {
                video.thumbnail_url.as_deref()
            } else {
                None
            };
            let request = SummaryRequest {
                video_id: &video.id,
                title: &video.title,
                description: non_blank(video.description.as_deref()),
                transcript: non_blank(video.transcript.as_deref())
                    .map(|t| truncate_chars(t, TRANSCRIPT_CHAR_LIMIT)),
                thumbnail_url,
            };

            let text = self.provider.summarize(request).await?;
            let text = text.trim();
            if text.is_empty() {
                return Err(AppError::EmptyResponse);
            }

            summaries.push(Some(Summary {
                text: text.to_string(),
                model: self.provider.model().to_string(),
            }));
        }

        Ok(summaries)
    }
}

// =============================================================================
// Channel ids (YouTube metadata)
// =============================================================================

#[derive(Clone)]
pub struct ChannelIdJob<M> {
    provider: M,
}

impl<M: MetadataProvider> ChannelIdJob<M> {
    pub fn new(provider: M) -> Self {
        Self { provider }
    }
}

impl<M: MetadataProvider> ExternalCall for ChannelIdJob<M> {
    type Item = Video;
    type Output = VideoMetadata;

    fn name(&self) -> &'static str {
        "channel-ids"
    }

    fn max_batch_size(&self) -> usize {
        self.provider.max_batch_size().min(YOUTUBE_VIDEOS_LIST_LIMIT)
    }

    fn mode(&self) -> CallMode {
        CallMode::Batched
    }

    async fn call(&self, videos: &[Video]) -> Result<Vec<Option<VideoMetadata>>, AppError> {
        let ids: Vec<String> = videos.iter().map(|v| v.id.clone()).collect();
        let mut by_id: HashMap<String, VideoMetadata> = self
            .provider
            .fetch_metadata(&ids)
            .await?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        Ok(videos.iter().map(|v| by_id.remove(&v.id)).collect())
    }
}

// =============================================================================
// Topic cluster centroids
// =============================================================================

#[derive(Clone)]
pub struct CentroidJob<V> {
    store: V,
}

impl<V: VectorStore> CentroidJob<V> {
    pub fn new(store: V) -> Self {
        Self { store }
    }

    async fn centroid_for(&self, cluster: &TopicCluster) -> Result<Option<Centroid>, AppError> {
        let fetch_size = self.store.max_fetch_size().max(1);
        let mut vectors = Vec::with_capacity(cluster.video_ids.len());

        for ids in cluster.video_ids.chunks(fetch_size) {
            let mut fetched = self.store.fetch_vectors(ids).await?;
            vectors.extend(ids.iter().filter_map(|id| fetched.remove(id)));
        }

        if vectors.len() < cluster.video_ids.len() {
            tracing::debug!(
                cluster = %cluster.id,
                members = cluster.video_ids.len(),
                found = vectors.len(),
                "Some cluster members have no stored vector"
            );
        }

        Ok(mean_vector(&vectors)?.map(|vector| Centroid {
            vector,
            member_count: vectors.len(),
        }))
    }
}

impl<V: VectorStore> ExternalCall for CentroidJob<V> {
    type Item = TopicCluster;
    type Output = Centroid;

    fn name(&self) -> &'static str {
        "centroids"
    }

    fn max_batch_size(&self) -> usize {
        CENTROID_CLUSTER_BATCH_LIMIT
    }

    fn mode(&self) -> CallMode {
        CallMode::PerItem
    }

    fn check(&self, cluster: &TopicCluster) -> Result<(), AppError> {
        if cluster.video_ids.is_empty() {
            return Err(invalid(&cluster.id, "cluster has no member videos"));
        }
        Ok(())
    }

    async fn call(&self, clusters: &[TopicCluster]) -> Result<Vec<Option<Centroid>>, AppError> {
        let mut centroids = Vec::with_capacity(clusters.len());
        for cluster in clusters {
            centroids.push(self.centroid_for(cluster).await?);
        }
        Ok(centroids)
    }
}

/// Element-wise mean. `None` for no vectors; an error on mixed dimensions.
pub fn mean_vector(vectors: &[Vec<f32>]) -> Result<Option<Vec<f32>>, AppError> {
    let Some(first) = vectors.first() else {
        return Ok(None);
    };
    let dimension = first.len();

    let mut sum = vec![0.0f64; dimension];
    for vector in vectors {
        if vector.len() != dimension {
            return Err(AppError::Generic(format!(
                "cannot average vectors of dimension {} and {}",
                dimension,
                vector.len()
            )));
        }
        for (acc, x) in sum.iter_mut().zip(vector) {
            *acc += f64::from(*x);
        }
    }

    let n = vectors.len() as f64;
    Ok(Some(sum.into_iter().map(|acc| (acc / n) as f32).collect()))
}
