//! Tubeline DB - PostgreSQL with pgvector as work source and result store
//!
//! # Overview
//!
//! The main components are:
//! - [`VideoRepository`] - keyset selection of pending rows and idempotent upserts
//! - [`PendingVideos`] / [`PendingClusters`] - `WorkSource` adapters for the runner
//! - [`MIGRATIONS`] - the schema the repository expects

mod repository;
mod sources;

pub use repository::{VideoRepository, parse_publish_date};
pub use sources::{PendingClusters, PendingVideos};

/// Dimension of the `vector(1536)` embedding and centroid columns.
pub const EMBEDDING_DIMENSION: usize = 1536;

/// Initial schema. Statements are separated by `;` and contain no other `;`.
pub const MIGRATIONS: &str = include_str!("../migrations/0001_init.sql");

/// Splits [`MIGRATIONS`] into individual statements.
///
/// sqlx runs prepared statements one at a time, so each is executed
/// separately.
pub fn migration_statements() -> impl Iterator<Item = &'static str> {
    MIGRATIONS
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Applies [`MIGRATIONS`] to `pool`. Every statement is `IF NOT EXISTS`.
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), tubeline_core::AppError> {
    for statement in migration_statements() {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(tubeline_core::AppError::DatabaseError)?;
    }
    Ok(())
}
