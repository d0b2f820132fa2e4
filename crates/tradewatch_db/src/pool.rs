//! Pool creation with compile-time database selection.
//!
//! Concrete pool types (not `sqlx::AnyPool`) so chrono and enum bindings
//! work without erasure.
//!
//! - `postgres` feature: `PgPool`
//! - `sqlite` feature (default): `SqlitePool`
//!
//! If both features are enabled, `sqlite` wins (it is the default build).

use crate::error::{DbError, Result};
use tracing::info;

#[cfg(feature = "sqlite")]
pub type DbPool = sqlx::SqlitePool;

#[cfg(all(feature = "postgres", not(feature = "sqlite")))]
pub type DbPool = sqlx::PgPool;

#[cfg(feature = "sqlite")]
pub type DbRow = sqlx::sqlite::SqliteRow;

#[cfg(all(feature = "postgres", not(feature = "sqlite")))]
pub type DbRow = sqlx::postgres::PgRow;

/// Create a pool for the given URL and apply engine-specific settings.
pub async fn create_pool(url: &str) -> Result<DbPool> {
    #[cfg(feature = "sqlite")]
    {
        if !url.starts_with("sqlite:") {
            return Err(DbError::invalid_state(format!(
                "This build supports sqlite: URLs only, got: {url}"
            )));
        }

        // A shared in-memory database only exists per-connection.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        // WAL mode for concurrent readers alongside the writer.
        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL").execute(&pool).await?;
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;

        info!("Connected to SQLite database");
        return Ok(pool);
    }

    #[cfg(all(feature = "postgres", not(feature = "sqlite")))]
    {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;

        info!("Connected to Postgres database");
        return Ok(pool);
    }

    #[allow(unreachable_code)]
    Err(DbError::invalid_state(
        "No database backend compiled in; enable the sqlite or postgres feature".to_string(),
    ))
}
