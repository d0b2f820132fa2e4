//! Schema creation for all Tradewatch tables.
//!
//! All CREATE TABLE statements live here - single source of truth.

use crate::error::Result;
use crate::TradewatchDb;
use tracing::info;

impl TradewatchDb {
    /// Ensure all tables exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        self.create_politician_tables().await?;
        self.create_disclosure_tables().await?;
        self.create_storage_tables().await?;
        self.create_scheduler_tables().await?;
        self.create_quality_tables().await?;

        info!("Database schema verified");
        Ok(())
    }

    async fn create_politician_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS politicians (
                id TEXT PRIMARY KEY,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                full_name TEXT NOT NULL,
                role TEXT NOT NULL,
                party TEXT,
                state_or_country TEXT,
                district TEXT,
                chamber TEXT,
                bioguide_id TEXT,
                source TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        // Unique by bioguide id when present; the partial index leaves
        // rows without one to the name-key check in the upsert path.
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_politicians_bioguide
             ON politicians(bioguide_id) WHERE bioguide_id IS NOT NULL",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_politicians_name
             ON politicians(last_name, first_name)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_disclosure_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS trading_disclosures (
                id TEXT PRIMARY KEY,
                politician_id TEXT NOT NULL REFERENCES politicians(id),
                transaction_date TEXT NOT NULL,
                disclosure_date TEXT NOT NULL,
                transaction_type TEXT NOT NULL,
                asset_name TEXT NOT NULL,
                asset_ticker TEXT,
                asset_type TEXT,
                amount_range_min REAL,
                amount_range_max REAL,
                amount_exact REAL,
                source TEXT,
                source_url TEXT,
                source_document_id TEXT,
                raw_data TEXT NOT NULL DEFAULT '{}',
                status TEXT NOT NULL DEFAULT 'active',
                has_raw_pdf INTEGER NOT NULL DEFAULT 0,
                has_parsed_data INTEGER NOT NULL DEFAULT 0,
                source_file_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        // Idempotence key for the publisher upsert.
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_disclosures_upsert_key
             ON trading_disclosures(politician_id, transaction_date, asset_name,
                                    transaction_type, disclosure_date)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_disclosures_politician
             ON trading_disclosures(politician_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_disclosures_ticker
             ON trading_disclosures(asset_ticker)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_storage_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS stored_files (
                id TEXT PRIMARY KEY,
                disclosure_id TEXT,
                storage_bucket TEXT NOT NULL,
                storage_path TEXT NOT NULL,
                file_type TEXT NOT NULL,
                file_size_bytes INTEGER NOT NULL,
                file_hash_sha256 TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                source_url TEXT,
                source_type TEXT NOT NULL,
                parse_status TEXT NOT NULL DEFAULT 'pending',
                parse_error TEXT,
                transactions_found INTEGER NOT NULL DEFAULT 0,
                parsed_at TEXT,
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(storage_bucket, file_hash_sha256)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_stored_files_status
             ON stored_files(storage_bucket, parse_status, created_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_scheduler_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS scheduled_jobs (
                job_id TEXT PRIMARY KEY,
                job_name TEXT NOT NULL,
                job_function TEXT NOT NULL,
                schedule_type TEXT NOT NULL,
                schedule_value TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                last_run_at TEXT,
                next_scheduled_run TEXT,
                consecutive_failures INTEGER NOT NULL DEFAULT 0,
                max_consecutive_failures INTEGER NOT NULL DEFAULT 3,
                auto_retry_on_startup INTEGER NOT NULL DEFAULT 1,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS job_executions (
                id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                duration_seconds REAL,
                error_message TEXT,
                logs TEXT NOT NULL DEFAULT '',
                metadata TEXT NOT NULL DEFAULT '{}'
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_job_executions_job
             ON job_executions(job_id, started_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_quality_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS data_quality_corrections (
                id TEXT PRIMARY KEY,
                table_name TEXT NOT NULL,
                record_id TEXT NOT NULL,
                field_name TEXT NOT NULL,
                correction_type TEXT NOT NULL,
                old_value TEXT,
                new_value TEXT,
                confidence REAL NOT NULL DEFAULT 1.0,
                corrected_by TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'applied',
                created_at TEXT NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_corrections_record
             ON data_quality_corrections(table_name, record_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
