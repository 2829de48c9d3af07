//! [`WorkSource`] adapters over [`VideoRepository`].

use tubeline_core::error::AppError;
use tubeline_core::models::{TopicCluster, Video, VideoFilter};
use tubeline_core::traits::WorkSource;

use crate::repository::VideoRepository;

/// Videos matching a "not yet processed" filter, in id order.
#[derive(Clone)]
pub struct PendingVideos {
    repo: VideoRepository,
    filter: VideoFilter,
}

impl PendingVideos {
    pub fn new(repo: VideoRepository, filter: VideoFilter) -> Self {
        Self { repo, filter }
    }

    pub fn filter(&self) -> VideoFilter {
        self.filter
    }
}

impl WorkSource for PendingVideos {
    type Item = Video;

    async fn next_page(&self, after: Option<&str>, page_size: usize) -> Result<Vec<Video>, AppError> {
        self.repo.select_pending(self.filter, after, page_size).await
    }

    async fn count_pending(&self, after: Option<&str>) -> Result<Option<u64>, AppError> {
        self.repo.count_pending(self.filter, after).await.map(Some)
    }
}

/// Topic clusters that have no centroid yet, in id order.
#[derive(Clone)]
pub struct PendingClusters {
    repo: VideoRepository,
}

impl PendingClusters {
    pub fn new(repo: VideoRepository) -> Self {
        Self { repo }
    }
}

impl WorkSource for PendingClusters {
    type Item = TopicCluster;

    async fn next_page(
        &self,
        after: Option<&str>,
        page_size: usize,
    ) -> Result<Vec<TopicCluster>, AppError> {
        self.repo.select_pending_clusters(after, page_size).await
    }

    async fn count_pending(&self, after: Option<&str>) -> Result<Option<u64>, AppError> {
        self.repo.count_pending_clusters(after).await.map(Some)
    }
}
