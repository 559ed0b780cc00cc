//! PostgreSQL access layer: pool construction, the file-registry
//! repository, and the advisory-lock run guard.

pub mod error;
pub mod lock;
pub mod repositories;

use sqlx::postgres::PgPoolOptions;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
///
/// The orchestrator is single-threaded, so a handful of connections
/// (queries plus the dedicated lock connection) is plenty.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}
