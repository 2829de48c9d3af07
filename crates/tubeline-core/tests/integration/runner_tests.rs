//! Integration tests for `BatchRunner` against in-memory mocks.

use std::sync::atomic::Ordering;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tubeline_core::{
    BatchRunner, Checkpoint, CheckpointStore, Embedding, ItemOutcome, RunStats, RunStatus,
    SilentReporter, Video, batch_count,
};

use super::common::{
    MockCall, MockWorkSource, MockWriter, RecordingReporter, run_config, video_id, videos,
};

fn checkpoint_store(dir: &TempDir) -> CheckpointStore {
    CheckpointStore::new(dir.path().join("mock.checkpoint.json"), "mock")
}

#[tokio::test]
async fn test_125_items_run_in_batches_of_50_50_25() {
    let dir = TempDir::new().unwrap();
    let source = MockWorkSource::new(videos(125));
    let call = MockCall::batched();
    let writer = MockWriter::<Embedding>::new();

    let runner = BatchRunner::new(source, call.clone(), writer.clone(), run_config(&dir));
    let result = runner.run_to_completion().await.unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(call.call_sizes(), vec![50, 50, 25]);
    assert_eq!(result.stats.processed, 125);
    assert_eq!(result.stats.successful, 125);
    assert_eq!(writer.len(), 125);
    assert_eq!(result.last_processed_id.as_deref(), Some("vid_0125"));
    assert!(!checkpoint_store(&dir).exists());
}

#[tokio::test]
async fn test_failed_batch_does_not_stop_the_run() {
    let dir = TempDir::new().unwrap();
    let reporter = RecordingReporter::new();
    // vid_0051 is the first item of batch 2
    let call = MockCall::batched().failing_on(&video_id(51));
    let writer = MockWriter::<Embedding>::new();

    let runner = BatchRunner::new(
        MockWorkSource::new(videos(125)),
        call.clone(),
        writer.clone(),
        run_config(&dir),
    );
    let result = runner
        .run(&reporter, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.stats.successful, 75);
    assert_eq!(result.stats.failed, 50);
    assert_eq!(result.stats.processed, 125);
    // Non-retryable failure: one call per batch, batch 3 still ran
    assert_eq!(call.call_sizes(), vec![50, 50, 25]);
    assert_eq!(reporter.count("item_failed:"), 50);
    assert!(writer.get(&video_id(50)).is_some());
    assert!(writer.get(&video_id(51)).is_none());
    assert!(writer.get(&video_id(101)).is_some());
    assert!(!checkpoint_store(&dir).exists());
}

#[tokio::test]
async fn test_failed_batch_errors_are_checkpointed() {
    let dir = TempDir::new().unwrap();
    let call = MockCall::batched().failing_on(&video_id(51));
    let config = run_config(&dir).with_limit(100);

    let runner = BatchRunner::new(
        MockWorkSource::new(videos(125)),
        call,
        MockWriter::<Embedding>::new(),
        config,
    );
    let result = runner.run_to_completion().await.unwrap();
    assert_eq!(result.status, RunStatus::LimitReached);

    let checkpoint = checkpoint_store(&dir).try_load().unwrap().unwrap();
    assert_eq!(checkpoint.last_processed_id.as_deref(), Some("vid_0100"));
    assert_eq!(checkpoint.stats.failed, 50);
    assert_eq!(checkpoint.errors.len(), 50);
    assert_eq!(checkpoint.errors[0].video_id, "vid_0051");
    assert!(checkpoint.errors[0].error.contains("bad request"));
}

#[tokio::test]
async fn test_interrupt_during_batch_two_keeps_batch_one_cursor() {
    let dir = TempDir::new().unwrap();
    let call = MockCall::batched().blocking_on(&video_id(51));
    let writer = MockWriter::<Embedding>::new();
    let cancel = CancellationToken::new();

    let canceller = {
        let cancel = cancel.clone();
        let writes = writer.write_counter();
        tokio::spawn(async move {
            while writes.load(Ordering::SeqCst) < 50 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            // Batch 2 is now blocked in its external call
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        })
    };

    let reporter = RecordingReporter::new();
    let runner = BatchRunner::new(
        MockWorkSource::new(videos(125)),
        call,
        writer.clone(),
        run_config(&dir),
    );
    let result = runner.run(&reporter, cancel).await.unwrap();
    canceller.await.unwrap();

    assert_eq!(result.status, RunStatus::Interrupted);
    assert!(result.is_interrupted());
    assert_eq!(result.stats.processed, 50);
    assert_eq!(result.last_processed_id.as_deref(), Some("vid_0050"));
    assert!(
        reporter
            .events()
            .contains(&"run_interrupted:vid_0050".to_string())
    );

    let checkpoint = checkpoint_store(&dir).try_load().unwrap().unwrap();
    assert_eq!(checkpoint.last_processed_id.as_deref(), Some("vid_0050"));
    assert_eq!(checkpoint.stats.successful, 50);
}

#[tokio::test]
async fn test_resume_after_interrupt_finishes_the_rest() {
    let dir = TempDir::new().unwrap();
    let source = MockWorkSource::new(videos(125));
    let writer = MockWriter::<Embedding>::new();

    let mut checkpoint = Checkpoint::new("mock");
    let mut first_batch = RunStats::new();
    for _ in 0..50 {
        first_batch.record(ItemOutcome::Succeeded);
    }
    checkpoint.record_batch(&first_batch);
    checkpoint.advance(&video_id(50));
    checkpoint_store(&dir).save(&checkpoint).unwrap();

    let reporter = RecordingReporter::new();
    let runner = BatchRunner::new(
        source.clone(),
        MockCall::batched(),
        writer.clone(),
        run_config(&dir),
    );
    let result = runner
        .run(&reporter, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.stats.processed, 75);
    assert_eq!(result.cumulative.processed, 125);
    assert_eq!(result.cumulative.successful, 125);
    assert_eq!(
        source.requested_cursors().first(),
        Some(&Some("vid_0050".to_string()))
    );
    assert!(writer.ids().iter().all(|id| id.as_str() > "vid_0050"));
    assert_eq!(reporter.events()[0], "resumed:vid_0050");
    assert!(
        reporter
            .events()
            .contains(&"run_started:Some(75)".to_string())
    );
    assert!(!checkpoint_store(&dir).exists());
}

#[tokio::test]
async fn test_resume_never_emits_keys_at_or_before_cursor() {
    let dir = TempDir::new().unwrap();
    let mut checkpoint = Checkpoint::new("mock");
    checkpoint.advance(&video_id(100));
    checkpoint_store(&dir).save(&checkpoint).unwrap();

    let call = MockCall::batched();
    let writer = MockWriter::<Embedding>::new();
    let runner = BatchRunner::new(
        MockWorkSource::new(videos(125)),
        call.clone(),
        writer.clone(),
        run_config(&dir),
    );
    let result = runner.run_to_completion().await.unwrap();

    assert_eq!(result.stats.processed, 25);
    assert_eq!(call.call_sizes(), vec![25]);
    assert_eq!(writer.ids().first().map(String::as_str), Some("vid_0101"));
}

#[tokio::test]
async fn test_fresh_start_ignores_checkpoint() {
    let dir = TempDir::new().unwrap();
    let mut checkpoint = Checkpoint::new("mock");
    checkpoint.advance(&video_id(100));
    checkpoint_store(&dir).save(&checkpoint).unwrap();

    let source = MockWorkSource::new(videos(125));
    let runner = BatchRunner::new(
        source.clone(),
        MockCall::batched(),
        MockWriter::<Embedding>::new(),
        run_config(&dir).with_fresh_start(),
    );
    let result = runner.run_to_completion().await.unwrap();

    assert_eq!(result.stats.processed, 125);
    assert_eq!(source.requested_cursors().first(), Some(&None));
}

#[tokio::test]
async fn test_corrupt_checkpoint_starts_from_zero() {
    let dir = TempDir::new().unwrap();
    std::fs::write(checkpoint_store(&dir).path(), "{\"version\": 1, \"job\": ").unwrap();

    let source = MockWorkSource::new(videos(10));
    let runner = BatchRunner::new(
        source.clone(),
        MockCall::batched(),
        MockWriter::<Embedding>::new(),
        run_config(&dir),
    );
    let result = runner.run_to_completion().await.unwrap();

    assert_eq!(result.stats.processed, 10);
    assert_eq!(source.requested_cursors().first(), Some(&None));
    assert!(!checkpoint_store(&dir).exists());
}

#[tokio::test]
async fn test_dry_run_calls_and_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let call = MockCall::batched();
    let writer = MockWriter::<Embedding>::new();

    let runner = BatchRunner::new(
        MockWorkSource::new(videos(125)),
        call.clone(),
        writer.clone(),
        run_config(&dir).with_dry_run(),
    );
    let result = runner.run_to_completion().await.unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.stats.processed, 125);
    assert_eq!(result.stats.skipped, 125);
    assert_eq!(call.calls(), 0);
    assert_eq!(writer.writes(), 0);
    assert!(!checkpoint_store(&dir).exists());
}

#[tokio::test]
async fn test_dry_run_leaves_existing_checkpoint() {
    let dir = TempDir::new().unwrap();
    let mut checkpoint = Checkpoint::new("mock");
    checkpoint.advance(&video_id(120));
    checkpoint_store(&dir).save(&checkpoint).unwrap();

    let runner = BatchRunner::new(
        MockWorkSource::new(videos(125)),
        MockCall::batched(),
        MockWriter::<Embedding>::new(),
        run_config(&dir).with_dry_run(),
    );
    let result = runner.run_to_completion().await.unwrap();

    assert_eq!(result.stats.processed, 5);
    let kept = checkpoint_store(&dir).try_load().unwrap().unwrap();
    assert_eq!(kept.last_processed_id.as_deref(), Some("vid_0120"));
}

#[tokio::test]
async fn test_limit_stops_early_and_keeps_checkpoint() {
    let dir = TempDir::new().unwrap();
    let call = MockCall::batched();
    let reporter = RecordingReporter::new();

    let runner = BatchRunner::new(
        MockWorkSource::new(videos(125)),
        call.clone(),
        MockWriter::<Embedding>::new(),
        run_config(&dir).with_limit(60),
    );
    let result = runner
        .run(&reporter, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::LimitReached);
    assert_eq!(result.stats.processed, 60);
    assert_eq!(call.call_sizes(), vec![50, 10]);
    assert!(reporter.events().contains(&"limit_reached:60".to_string()));
    assert!(
        reporter
            .events()
            .contains(&"run_started:Some(60)".to_string())
    );

    let checkpoint = checkpoint_store(&dir).try_load().unwrap().unwrap();
    assert_eq!(checkpoint.last_processed_id.as_deref(), Some("vid_0060"));
}

#[tokio::test]
async fn test_limit_equal_to_pending_completes() {
    let dir = TempDir::new().unwrap();
    let reporter = RecordingReporter::new();

    let runner = BatchRunner::new(
        MockWorkSource::new(videos(60)),
        MockCall::batched(),
        MockWriter::<Embedding>::new(),
        run_config(&dir).with_limit(60),
    );
    let result = runner
        .run(&reporter, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.stats.processed, 60);
    assert_eq!(reporter.count("limit_reached:"), 0);
    assert!(!checkpoint_store(&dir).exists());
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let dir = TempDir::new().unwrap();
    let call = MockCall::batched().with_transient_failures(2);

    let runner = BatchRunner::new(
        MockWorkSource::new(videos(125)),
        call.clone(),
        MockWriter::<Embedding>::new(),
        run_config(&dir),
    );
    let result = runner.run_to_completion().await.unwrap();

    assert_eq!(result.stats.successful, 125);
    assert_eq!(result.stats.failed, 0);
    // Batch 1 needed three attempts
    assert_eq!(call.calls(), 5);
}

#[tokio::test]
async fn test_retries_exhausted_fail_the_batch() {
    let dir = TempDir::new().unwrap();
    let call = MockCall::batched().with_transient_failures(3);

    let runner = BatchRunner::new(
        MockWorkSource::new(videos(125)),
        call.clone(),
        MockWriter::<Embedding>::new(),
        run_config(&dir),
    );
    let result = runner.run_to_completion().await.unwrap();

    assert_eq!(result.stats.failed, 50);
    assert_eq!(result.stats.successful, 75);
    assert_eq!(call.calls(), 5);
}

#[tokio::test]
async fn test_exhausted_retries_are_recorded_with_attempts() {
    let dir = TempDir::new().unwrap();
    let call = MockCall::batched().with_transient_failures(3);

    let runner = BatchRunner::new(
        MockWorkSource::new(videos(125)),
        call,
        MockWriter::<Embedding>::new(),
        run_config(&dir).with_limit(100),
    );
    let result = runner.run_to_completion().await.unwrap();
    assert_eq!(result.status, RunStatus::LimitReached);
    assert_eq!(result.stats.failed, 50);

    let checkpoint = checkpoint_store(&dir).try_load().unwrap().unwrap();
    assert_eq!(checkpoint.errors.len(), 50);
    assert!(checkpoint.errors[0].error.starts_with("Gave up after 3 attempts"));
    assert!(checkpoint.errors[0].error.contains("connection reset"));
}

#[tokio::test]
async fn test_checkpoint_save_failure_does_not_stop_the_run() {
    let dir = TempDir::new().unwrap();
    let reporter = RecordingReporter::new();
    // A regular file where the checkpoint directory should be
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, b"").unwrap();
    let config = run_config(&dir).with_checkpoint_path(blocker.join("mock.checkpoint.json"));

    let writer = MockWriter::<Embedding>::new();
    let runner = BatchRunner::new(
        MockWorkSource::new(videos(125)),
        MockCall::batched(),
        writer.clone(),
        config,
    );
    let result = runner
        .run(&reporter, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.stats.successful, 125);
    assert_eq!(writer.len(), 125);
    assert_eq!(reporter.count("checkpoint_failed"), 3);
    assert_eq!(reporter.count("checkpoint_saved:"), 0);
    assert_eq!(reporter.events().last().map(String::as_str), Some("run_completed"));
}

#[tokio::test]
async fn test_per_item_failures_are_isolated() {
    let dir = TempDir::new().unwrap();
    let call = MockCall::per_item().failing_on(&video_id(3));
    let writer = MockWriter::<Embedding>::new();

    let runner = BatchRunner::new(
        MockWorkSource::new(videos(12)),
        call.clone(),
        writer.clone(),
        run_config(&dir).with_batch_size(5),
    );
    let result = runner.run_to_completion().await.unwrap();

    assert_eq!(result.stats.processed, 12);
    assert_eq!(result.stats.failed, 1);
    assert_eq!(result.stats.successful, 11);
    assert_eq!(call.calls(), 12);
    assert!(call.call_sizes().iter().all(|&n| n == 1));
    assert!(writer.get(&video_id(3)).is_none());
}

#[tokio::test]
async fn test_ineligible_and_missing_items_are_skipped() {
    let dir = TempDir::new().unwrap();
    let mut items = videos(10);
    items[1].title = "   ".to_string();
    let call = MockCall::batched().missing(&["vid_0004"]);
    let writer = MockWriter::<Embedding>::new();

    let runner = BatchRunner::new(
        MockWorkSource::new(items),
        call.clone(),
        writer.clone(),
        run_config(&dir),
    );
    let result = runner.run_to_completion().await.unwrap();

    assert_eq!(result.stats.processed, 10);
    assert_eq!(result.stats.skipped, 2);
    assert_eq!(result.stats.successful, 8);
    // The ineligible item never reaches the provider
    assert_eq!(call.call_sizes(), vec![9]);
    assert!(writer.get("vid_0002").is_none());
    assert!(writer.get("vid_0004").is_none());
}

#[tokio::test]
async fn test_write_failures_count_as_failed() {
    let dir = TempDir::new().unwrap();
    let writer = MockWriter::<Embedding>::new().failing_for(&["vid_0007"]);

    let runner = BatchRunner::new(
        MockWorkSource::new(videos(10)),
        MockCall::batched(),
        writer.clone(),
        run_config(&dir),
    );
    let result = runner.run_to_completion().await.unwrap();

    assert_eq!(result.stats.failed, 1);
    assert_eq!(result.stats.successful, 9);
    assert_eq!(writer.len(), 9);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let writer = MockWriter::<Embedding>::new();
    let runner = BatchRunner::new(
        MockWorkSource::new(videos(30)),
        MockCall::batched(),
        writer.clone(),
        run_config(&dir).with_fresh_start(),
    );

    runner.run_to_completion().await.unwrap();
    let first = writer.get(&video_id(17));
    runner.run_to_completion().await.unwrap();

    assert_eq!(writer.len(), 30);
    assert_eq!(writer.writes(), 60);
    assert_eq!(writer.get(&video_id(17)), first);
}

#[tokio::test]
async fn test_fatal_error_aborts_after_saving_checkpoint() {
    let dir = TempDir::new().unwrap();
    let call = MockCall::batched().fatal_on(&video_id(51));

    let runner = BatchRunner::new(
        MockWorkSource::new(videos(125)),
        call.clone(),
        MockWriter::<Embedding>::new(),
        run_config(&dir),
    );
    let err = runner.run_to_completion().await.unwrap_err();

    assert!(err.is_fatal());
    // No retry and no batch 3
    assert_eq!(call.calls(), 2);
    let checkpoint = checkpoint_store(&dir).try_load().unwrap().unwrap();
    assert_eq!(checkpoint.last_processed_id.as_deref(), Some("vid_0050"));
}

#[tokio::test]
async fn test_batch_size_capped_by_provider_limit() {
    let dir = TempDir::new().unwrap();
    let call = MockCall::batched().with_max_batch_size(20);

    let runner = BatchRunner::new(
        MockWorkSource::new(videos(45)),
        call.clone(),
        MockWriter::<Embedding>::new(),
        run_config(&dir).with_batch_size(50),
    );
    assert_eq!(runner.batch_size(), 20);
    runner.run_to_completion().await.unwrap();

    assert_eq!(call.call_sizes(), vec![20, 20, 5]);
}

#[tokio::test]
async fn test_pagination_uses_last_key_of_each_page() {
    let dir = TempDir::new().unwrap();
    let source = MockWorkSource::new(videos(25));

    let runner = BatchRunner::new(
        source.clone(),
        MockCall::batched(),
        MockWriter::<Embedding>::new(),
        run_config(&dir).with_page_size(10).with_batch_size(4),
    );
    let result = runner.run_to_completion().await.unwrap();

    assert_eq!(result.stats.processed, 25);
    // Pages of 10 are trimmed to two whole batches of 4
    assert_eq!(
        source.requested_cursors(),
        vec![
            None,
            Some("vid_0008".to_string()),
            Some("vid_0016".to_string()),
            Some("vid_0024".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_page_boundaries_never_split_a_batch() {
    let dir = TempDir::new().unwrap();
    let call = MockCall::batched();

    let runner = BatchRunner::new(
        MockWorkSource::new(videos(25)),
        call.clone(),
        MockWriter::<Embedding>::new(),
        run_config(&dir).with_page_size(10).with_batch_size(4),
    );
    runner.run_to_completion().await.unwrap();

    assert_eq!(call.call_sizes(), vec![4, 4, 4, 4, 4, 4, 1]);
    assert_eq!(call.call_sizes().len(), batch_count(25, 4));
}

#[tokio::test]
async fn test_default_page_with_uneven_batch_size() {
    let dir = TempDir::new().unwrap();
    let call = MockCall::batched();

    let runner = BatchRunner::new(
        MockWorkSource::new(videos(1000)),
        call.clone(),
        MockWriter::<Embedding>::new(),
        run_config(&dir).with_batch_size(30),
    );
    let result = runner.run_to_completion().await.unwrap();

    let sizes = call.call_sizes();
    assert_eq!(result.stats.processed, 1000);
    assert_eq!(sizes.len(), batch_count(1000, 30));
    assert!(sizes[..sizes.len() - 1].iter().all(|&n| n == 30));
    assert_eq!(sizes.last(), Some(&10));
}

#[tokio::test]
async fn test_progress_events_per_batch() {
    let dir = TempDir::new().unwrap();
    let reporter = RecordingReporter::new();

    let runner = BatchRunner::new(
        MockWorkSource::new(videos(125)),
        MockCall::batched(),
        MockWriter::<Embedding>::new(),
        run_config(&dir),
    );
    runner
        .run(&reporter, CancellationToken::new())
        .await
        .unwrap();

    let events = reporter.events();
    assert_eq!(events[0], "run_started:Some(125)");
    assert_eq!(reporter.count("batch_started:"), 3);
    assert!(events.contains(&"batch_completed:2:100".to_string()));
    assert!(events.contains(&"checkpoint_saved:vid_0125".to_string()));
    assert_eq!(events.last().map(String::as_str), Some("run_completed"));
}

#[tokio::test]
async fn test_empty_source_completes_immediately() {
    let dir = TempDir::new().unwrap();
    let call = MockCall::batched();

    let runner = BatchRunner::new(
        MockWorkSource::new(Vec::<Video>::new()),
        call.clone(),
        MockWriter::<Embedding>::new(),
        run_config(&dir),
    );
    let result = runner
        .run(&SilentReporter, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.stats.processed, 0);
    assert_eq!(call.calls(), 0);
}

#[tokio::test]
async fn test_cancelled_before_start_is_interrupted() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let runner = BatchRunner::new(
        MockWorkSource::new(videos(10)),
        MockCall::batched(),
        MockWriter::<Embedding>::new(),
        run_config(&dir),
    );
    let result = runner.run(&SilentReporter, cancel).await.unwrap();

    assert_eq!(result.status, RunStatus::Interrupted);
    assert_eq!(result.stats.processed, 0);
    assert!(result.last_processed_id.is_none());
    assert!(!checkpoint_store(&dir).exists());
}
