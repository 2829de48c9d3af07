//! End-to-end tests of the job adapters driven by `BatchRunner`.

use tempfile::TempDir;
use tubeline_core::{
    AppError, BatchRunner, Embedding, EmbeddingJob, RunStatus, Summary, SummaryJob,
    SummaryProvider, SummaryRequest, Video,
};

use super::common::{MockEmbeddingProvider, MockWorkSource, MockWriter, run_config, videos};

#[derive(Clone)]
struct TitleSummarizer;

impl SummaryProvider for TitleSummarizer {
    fn name(&self) -> &'static str {
        "title"
    }

    fn model(&self) -> &str {
        "title-v1"
    }

    async fn summarize(&self, request: SummaryRequest<'_>) -> Result<String, AppError> {
        if request.title.ends_with('7') {
            return Err(AppError::EmptyResponse);
        }
        Ok(format!("About {}", request.title))
    }
}

#[tokio::test]
async fn test_embedding_job_batches_by_provider_limit() {
    let dir = TempDir::new().unwrap();
    let provider = MockEmbeddingProvider::new(8);
    let writer = MockWriter::<Embedding>::new();

    let runner = BatchRunner::new(
        MockWorkSource::new(videos(125)),
        EmbeddingJob::new(provider.clone()),
        writer.clone(),
        run_config(&dir).with_batch_size(500),
    );
    let result = runner.run_to_completion().await.unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.stats.successful, 125);
    assert_eq!(provider.request_sizes(), vec![100, 25]);
    assert_eq!(writer.get("vid_0001").map(|e| e.0.len()), Some(8));
}

#[tokio::test]
async fn test_embedding_job_skips_videos_without_text() {
    let dir = TempDir::new().unwrap();
    let mut items = videos(5);
    items[2].title = String::new();
    let writer = MockWriter::<Embedding>::new();

    let runner = BatchRunner::new(
        MockWorkSource::new(items),
        EmbeddingJob::new(MockEmbeddingProvider::new(4)),
        writer.clone(),
        run_config(&dir),
    );
    let result = runner.run_to_completion().await.unwrap();

    assert_eq!(result.stats.skipped, 1);
    assert_eq!(result.stats.successful, 4);
    assert!(writer.get("vid_0003").is_none());
}

#[tokio::test]
async fn test_summary_job_runs_per_item() {
    let dir = TempDir::new().unwrap();
    let items: Vec<Video> = videos(12)
        .into_iter()
        .map(|mut v| {
            v.description = Some(format!("Description of {}", v.id));
            v
        })
        .collect();
    let writer = MockWriter::<Summary>::new();

    let runner = BatchRunner::new(
        MockWorkSource::new(items),
        SummaryJob::new(TitleSummarizer),
        writer.clone(),
        run_config(&dir).with_concurrency(3),
    );
    let result = runner.run_to_completion().await.unwrap();

    // "Video 7" fails with an empty response; the others are isolated from it
    assert_eq!(result.stats.processed, 12);
    assert_eq!(result.stats.failed, 1);
    assert_eq!(result.stats.successful, 11);

    let summary = writer.get("vid_0001").unwrap();
    assert_eq!(summary.text, "About Video 1");
    assert_eq!(summary.model, "title-v1");
    assert!(writer.get("vid_0007").is_none());
}
