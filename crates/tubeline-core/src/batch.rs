//! Fixed-size batching bounded by provider limits.

/// YouTube Data API `videos.list` accepts at most 50 ids per request.
pub const YOUTUBE_VIDEOS_LIST_LIMIT: usize = 50;
/// Inputs per OpenAI embeddings request used by the backfills.
pub const OPENAI_EMBEDDING_BATCH_LIMIT: usize = 100;
/// Chat completions paired with a thumbnail image, per batch.
pub const VISION_CHAT_BATCH_LIMIT: usize = 10;
/// Pinecone `vectors/fetch` accepts at most 10,000 ids per request.
pub const VECTOR_FETCH_LIMIT: usize = 10_000;
/// Topic clusters per centroid batch. Each cluster is its own fetch.
pub const CENTROID_CLUSTER_BATCH_LIMIT: usize = 10;

/// Number of batches `n` items produce with batch size `batch_size`.
pub fn batch_count(n: usize, batch_size: usize) -> usize {
    n.div_ceil(batch_size.max(1))
}

/// Effective batch size: `min(configured, provider_limit)`, at least 1.
pub fn effective_batch_size(configured: usize, provider_limit: usize) -> usize {
    configured.min(provider_limit).max(1)
}

/// Page size rounded down to a whole number of batches, at least one batch.
///
/// Pages are split independently, so a page that is not a multiple of the
/// batch size would leave a short batch in the middle of a run.
pub fn aligned_page_size(page_size: usize, batch_size: usize) -> usize {
    let batch_size = batch_size.max(1);
    (page_size / batch_size).max(1) * batch_size
}

/// Splits owned items into consecutive batches of `size`.
///
/// Every batch holds exactly `size` items except the last, which holds the
/// remainder. Nothing is padded or dropped.
pub struct Batcher<I> {
    items: std::vec::IntoIter<I>,
    size: usize,
}

impl<I> Batcher<I> {
    pub fn new(items: Vec<I>, size: usize) -> Self {
        Self {
            items: items.into_iter(),
            size: size.max(1),
        }
    }
}

impl<I> Iterator for Batcher<I> {
    type Item = Vec<I>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch: Vec<I> = self.items.by_ref().take(self.size).collect();
        if batch.is_empty() { None } else { Some(batch) }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = batch_count(self.items.len(), self.size);
        (n, Some(n))
    }
}

impl<I> ExactSizeIterator for Batcher<I> {}
