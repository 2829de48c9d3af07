//! Video and topic cluster repository for PostgreSQL with pgvector support.
//!
//! Selection uses keyset pagination on the primary key
//! (`WHERE id > $cursor ORDER BY id LIMIT $n`), so rows updated by a running
//! backfill never shift the pages that follow. Every write is an
//! `INSERT ... ON CONFLICT (id) DO UPDATE`, so replaying a batch after a crash
//! converges to the same final state.

use chrono::NaiveDate;
use pgvector::Vector;
use sqlx::{PgPool, Pool, Postgres};
use tubeline_core::error::AppError;
use tubeline_core::models::{
    Centroid, Embedding, Summary, TopicCluster, Video, VideoFilter, VideoMetadata, VideoPredicate,
};
use tubeline_core::traits::ResultWriter;

/// Column list for video SELECT queries. Must remain a const literal to ensure
/// SQL safety since format!() bypasses sqlx compile-time validation.
const VIDEO_COLUMNS: &str =
    "id, channel_id, title, description, transcript, thumbnail_url, published_at, llm_summary";

/// Shared WHERE tail: `$1` cursor, `$2` publish date.
const VIDEO_KEYSET_FILTER: &str = "($1::text IS NULL OR id > $1) \
     AND ($2::date IS NULL OR (published_at AT TIME ZONE 'UTC')::date = $2)";

const PENDING_CLUSTERS_QUERY: &str = r#"
    SELECT c.id, c.label,
           COALESCE(array_agg(v.id ORDER BY v.id) FILTER (WHERE v.id IS NOT NULL), '{}') AS video_ids
    FROM topic_clusters c
    LEFT JOIN videos v ON v.topic_cluster_id = c.id
    WHERE c.centroid IS NULL AND ($1::text IS NULL OR c.id > $1)
    GROUP BY c.id, c.label
    ORDER BY c.id
    LIMIT $2
"#;

/// SQL condition selecting rows that still need the given backfill.
fn predicate_sql(predicate: VideoPredicate) -> &'static str {
    match predicate {
        VideoPredicate::MissingSummary => "llm_summary IS NULL",
        VideoPredicate::MissingEmbedding => "embedding IS NULL",
        VideoPredicate::MissingChannelId => "channel_id IS NULL",
    }
}

/// Repository for videos and topic clusters in PostgreSQL with pgvector.
///
/// # Examples
///
/// ```no_run
/// use sqlx::postgres::PgPoolOptions;
/// use tubeline_db::VideoRepository;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = PgPoolOptions::new()
///     .max_connections(5)
///     .connect("postgresql://localhost/tubeline")
///     .await?;
///
/// let repo = VideoRepository::new(pool);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct VideoRepository {
    pool: Pool<Postgres>,
}

impl VideoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // =========================================================================
    // Videos
    // =========================================================================

    /// Returns up to `limit` videos matching `filter` with an id greater than
    /// `after`, ordered by id.
    pub async fn select_pending(
        &self,
        filter: VideoFilter,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Video>, AppError> {
        let query = format!(
            "SELECT {} FROM videos WHERE {} AND {} ORDER BY id LIMIT $3",
            VIDEO_COLUMNS,
            predicate_sql(filter.predicate),
            VIDEO_KEYSET_FILTER
        );

        sqlx::query_as::<_, Video>(&query)
            .bind(after)
            .bind(filter.published_on)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::DatabaseError)
    }

    /// Counts videos matching `filter` with an id greater than `after`.
    pub async fn count_pending(
        &self,
        filter: VideoFilter,
        after: Option<&str>,
    ) -> Result<u64, AppError> {
        let query = format!(
            "SELECT COUNT(*) FROM videos WHERE {} AND {}",
            predicate_sql(filter.predicate),
            VIDEO_KEYSET_FILTER
        );

        let count: (i64,) = sqlx::query_as(&query)
            .bind(after)
            .bind(filter.published_on)
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        Ok(count.0.max(0) as u64)
    }

    /// Inserts a bare video row, or refreshes its descriptive fields.
    pub async fn upsert_video(&self, video: &Video) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO videos (id, channel_id, title, description, transcript, thumbnail_url, published_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                channel_id = COALESCE(EXCLUDED.channel_id, videos.channel_id),
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                transcript = COALESCE(EXCLUDED.transcript, videos.transcript),
                thumbnail_url = COALESCE(EXCLUDED.thumbnail_url, videos.thumbnail_url),
                published_at = COALESCE(EXCLUDED.published_at, videos.published_at),
                updated_at = NOW()
            "#,
        )
        .bind(&video.id)
        .bind(&video.channel_id)
        .bind(&video.title)
        .bind(&video.description)
        .bind(&video.transcript)
        .bind(&video.thumbnail_url)
        .bind(video.published_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(())
    }

    pub async fn upsert_summary(&self, video_id: &str, summary: &Summary) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO videos (id, llm_summary, llm_summary_model)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET
                llm_summary = EXCLUDED.llm_summary,
                llm_summary_model = EXCLUDED.llm_summary_model,
                updated_at = NOW()
            "#,
        )
        .bind(video_id)
        .bind(&summary.text)
        .bind(&summary.model)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(())
    }

    pub async fn upsert_embedding(&self, video_id: &str, embedding: Vec<f32>) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO videos (id, embedding)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET
                embedding = EXCLUDED.embedding,
                updated_at = NOW()
            "#,
        )
        .bind(video_id)
        .bind(Vector::from(embedding))
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(())
    }

    /// Stores `channel_id` and refreshes title, channel title and publish time.
    pub async fn upsert_channel_metadata(&self, metadata: &VideoMetadata) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO videos (id, channel_id, channel_title, title, published_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                channel_id = EXCLUDED.channel_id,
                channel_title = COALESCE(EXCLUDED.channel_title, videos.channel_title),
                title = EXCLUDED.title,
                published_at = COALESCE(EXCLUDED.published_at, videos.published_at),
                updated_at = NOW()
            "#,
        )
        .bind(&metadata.id)
        .bind(&metadata.channel_id)
        .bind(&metadata.channel_title)
        .bind(&metadata.title)
        .bind(metadata.published_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(())
    }

    /// Returns the stored embedding of a video, if any.
    pub async fn get_embedding(&self, video_id: &str) -> Result<Option<Vec<f32>>, AppError> {
        let row: Option<(Option<Vector>,)> =
            sqlx::query_as("SELECT embedding FROM videos WHERE id = $1")
                .bind(video_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(AppError::DatabaseError)?;

        Ok(row.and_then(|(v,)| v).map(|v| v.to_vec()))
    }

    // =========================================================================
    // Topic clusters
    // =========================================================================

    /// Returns up to `limit` clusters without a centroid and with an id
    /// greater than `after`, each with its member video ids.
    pub async fn select_pending_clusters(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<TopicCluster>, AppError> {
        sqlx::query_as::<_, TopicCluster>(PENDING_CLUSTERS_QUERY)
            .bind(after)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::DatabaseError)
    }

    pub async fn count_pending_clusters(&self, after: Option<&str>) -> Result<u64, AppError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM topic_clusters WHERE centroid IS NULL AND ($1::text IS NULL OR id > $1)",
        )
        .bind(after)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(count.0.max(0) as u64)
    }

    pub async fn upsert_centroid(&self, cluster_id: &str, centroid: Centroid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO topic_clusters (id, centroid, centroid_member_count)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET
                centroid = EXCLUDED.centroid,
                centroid_member_count = EXCLUDED.centroid_member_count,
                updated_at = NOW()
            "#,
        )
        .bind(cluster_id)
        .bind(Vector::from(centroid.vector))
        .bind(centroid.member_count as i32)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(())
    }
}

// =============================================================================
// Trait Implementation: ResultWriter
// =============================================================================

impl ResultWriter<Video, Embedding> for VideoRepository {
    async fn upsert(&self, item: &Video, output: Embedding) -> Result<(), AppError> {
        self.upsert_embedding(&item.id, output.0).await
    }
}

impl ResultWriter<Video, Summary> for VideoRepository {
    async fn upsert(&self, item: &Video, output: Summary) -> Result<(), AppError> {
        self.upsert_summary(&item.id, &output).await
    }
}

impl ResultWriter<Video, VideoMetadata> for VideoRepository {
    async fn upsert(&self, item: &Video, output: VideoMetadata) -> Result<(), AppError> {
        if output.id != item.id {
            return Err(AppError::InvalidInput {
                id: item.id.clone(),
                reason: format!("metadata returned for {}", output.id),
            });
        }
        self.upsert_channel_metadata(&output).await
    }
}

impl ResultWriter<TopicCluster, Centroid> for VideoRepository {
    async fn upsert(&self, item: &TopicCluster, output: Centroid) -> Result<(), AppError> {
        self.upsert_centroid(&item.id, output).await
    }
}

/// Parses `--date` style input, kept next to the date filter it feeds.
pub fn parse_publish_date(value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| {
        AppError::InvalidInput {
            id: value.to_string(),
            reason: format!("expected YYYY-MM-DD: {}", e),
        }
    })
}
