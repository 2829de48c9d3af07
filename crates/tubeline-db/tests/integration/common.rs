//! Test utilities for integration tests.
//!
//! Provides helper functions to set up isolated PostgreSQL containers
//! with the pgvector extension and the tubeline schema.

use chrono::{TimeZone, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use tubeline_core::Video;
use tubeline_db::VideoRepository;

/// Embedding dimension of the `vector(1536)` columns.
pub const DIMENSION: usize = 1536;

/// Sets up a PostgreSQL container with pgvector and returns a migrated pool.
///
/// Keep the returned container alive for the duration of the test.
pub async fn setup_test_db() -> (PgPool, ContainerAsync<GenericImage>) {
    let container = GenericImage::new("pgvector/pgvector", "pg16")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "postgres")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let connection_string = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

    // The server restarts once after init, so early connects can fail
    const MAX_RETRIES: u32 = 30;
    let mut retries = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .connect(&connection_string)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retries += 1;
                if retries >= MAX_RETRIES {
                    panic!(
                        "Failed to connect to database after {} retries: {}",
                        MAX_RETRIES, e
                    );
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    };

    tubeline_db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    (pool, container)
}

/// Reads a video row back, including the columns the backfills fill in.
pub async fn fetch_video(pool: &PgPool, id: &str) -> Video {
    sqlx::query_as::<_, Video>(
        "SELECT id, channel_id, title, description, transcript, thumbnail_url, published_at, \
         llm_summary FROM videos WHERE id = $1",
    )
    .bind(id)
    .fetch_one(pool)
    .await
    .expect("video exists")
}

/// A video with a title, description and publish date of 2026-10-`day`.
pub fn sample_video(id: &str, day: u32) -> Video {
    let mut video = Video::new(id, format!("Video {}", id));
    video.description = Some(format!("Description for {}", id));
    video.published_at = Utc.with_ymd_and_hms(2026, 10, day, 12, 0, 0).single();
    video
}

/// Inserts `count` videos named `vid_0001..`, all published on 2026-10-01.
pub async fn seed_videos(repo: &VideoRepository, count: usize) -> Vec<Video> {
    let mut seeded = Vec::with_capacity(count);
    for n in 1..=count {
        let video = sample_video(&format!("vid_{:04}", n), 1);
        repo.upsert_video(&video).await.expect("seed insert");
        seeded.push(video);
    }
    seeded
}

/// Inserts a topic cluster and assigns `members` to it.
pub async fn seed_cluster(pool: &PgPool, id: &str, members: &[&str]) {
    sqlx::query("INSERT INTO topic_clusters (id, label) VALUES ($1, $2)")
        .bind(id)
        .bind(format!("Topic {}", id))
        .execute(pool)
        .await
        .expect("insert cluster");

    for member in members {
        sqlx::query("UPDATE videos SET topic_cluster_id = $1 WHERE id = $2")
            .bind(id)
            .bind(member)
            .execute(pool)
            .await
            .expect("assign cluster");
    }
}

/// A constant vector of the table dimension.
pub fn constant_vector(value: f32) -> Vec<f32> {
    vec![value; DIMENSION]
}
