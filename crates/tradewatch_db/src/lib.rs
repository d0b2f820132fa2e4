//! Database layer for Tradewatch.
//!
//! All tables, row mappers, and per-domain operations live here. The pool
//! is feature-selected at compile time: SQLite (default) or Postgres.
//!
//! # Example
//!
//! ```rust,ignore
//! use tradewatch_db::TradewatchDb;
//!
//! let db = TradewatchDb::connect("sqlite:tradewatch.db?mode=rwc").await?;
//! let politicians = db.list_politicians().await?;
//! ```

pub mod corrections;
pub mod disclosures;
pub mod error;
pub mod executions;
pub mod files;
pub mod jobs;
pub mod politicians;
pub mod pool;
pub mod schema;
pub mod types;

pub use disclosures::BatchInsertOutcome;
pub use error::{DbError, Result};
pub use pool::{DbPool, DbRow};
pub use types::*;

/// Handle over the shared connection pool. Cloning is cheap; all clones
/// share the same pool.
#[derive(Clone)]
pub struct TradewatchDb {
    pub(crate) pool: DbPool,
}

impl TradewatchDb {
    /// Connect to the database and ensure the schema exists.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = pool::create_pool(url).await?;
        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// In-memory database for tests. Single connection, since each SQLite
    /// `:memory:` connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    /// Access to the underlying pool for callers with bespoke queries.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}
