//! Stored-file metadata operations.

use crate::error::Result;
use crate::types::{NewStoredFile, ParseStatus, StoredFile};
use crate::{DbError, DbRow, TradewatchDb};
use chrono::Utc;
use sqlx::Row;

impl TradewatchDb {
    /// Find a stored file by content hash within a bucket. The dedup path:
    /// identical bytes re-uploaded to the same bucket reuse this row.
    pub async fn find_stored_file_by_hash(
        &self,
        bucket: &str,
        file_hash: &str,
    ) -> Result<Option<StoredFile>> {
        let row = sqlx::query(
            "SELECT * FROM stored_files WHERE storage_bucket = ? AND file_hash_sha256 = ? LIMIT 1",
        )
        .bind(bucket)
        .bind(file_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_stored_file(&r)).transpose()
    }

    /// Insert a stored-file metadata row.
    pub async fn insert_stored_file(&self, new: &NewStoredFile) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO stored_files (
                id, disclosure_id, storage_bucket, storage_path, file_type,
                file_size_bytes, file_hash_sha256, mime_type, source_url,
                source_type, parse_status, transactions_found, expires_at,
                created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.disclosure_id)
        .bind(&new.storage_bucket)
        .bind(&new.storage_path)
        .bind(&new.file_type)
        .bind(new.file_size_bytes)
        .bind(&new.file_hash_sha256)
        .bind(&new.mime_type)
        .bind(&new.source_url)
        .bind(&new.source_type)
        .bind(new.parse_status.as_str())
        .bind(new.transactions_found)
        .bind(new.expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Transition a file to `success` and record the transaction count.
    pub async fn mark_file_parsed(&self, file_id: &str, transactions_count: i64) -> Result<()> {
        sqlx::query(
            "UPDATE stored_files
             SET parse_status = 'success', transactions_found = ?, parsed_at = ?
             WHERE id = ?",
        )
        .bind(transactions_count)
        .bind(Utc::now())
        .bind(file_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Transition a file to `failed` with the error message.
    pub async fn mark_file_failed(&self, file_id: &str, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE stored_files
             SET parse_status = 'failed', parse_error = ?, parsed_at = ?
             WHERE id = ?",
        )
        .bind(error)
        .bind(Utc::now())
        .bind(file_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Pending files in a bucket, oldest first (PDF reprocessing job).
    pub async fn files_to_parse(&self, bucket: &str, limit: i64) -> Result<Vec<StoredFile>> {
        let rows = sqlx::query(
            "SELECT * FROM stored_files
             WHERE storage_bucket = ? AND parse_status = 'pending'
             ORDER BY created_at ASC
             LIMIT ?",
        )
        .bind(bucket)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_stored_file).collect()
    }

    pub async fn get_stored_file(&self, file_id: &str) -> Result<StoredFile> {
        let row = sqlx::query("SELECT * FROM stored_files WHERE id = ?")
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => row_to_stored_file(&r),
            None => Err(DbError::not_found(format!("stored file {file_id}"))),
        }
    }
}

pub(crate) fn row_to_stored_file(row: &DbRow) -> Result<StoredFile> {
    let status_str: String = row.get("parse_status");
    let parse_status = ParseStatus::parse(&status_str)
        .ok_or_else(|| DbError::invalid_state(format!("Unknown parse status: {status_str}")))?;

    Ok(StoredFile {
        id: row.get("id"),
        disclosure_id: row.get("disclosure_id"),
        storage_bucket: row.get("storage_bucket"),
        storage_path: row.get("storage_path"),
        file_type: row.get("file_type"),
        file_size_bytes: row.get("file_size_bytes"),
        file_hash_sha256: row.get("file_hash_sha256"),
        mime_type: row.get("mime_type"),
        source_url: row.get("source_url"),
        source_type: row.get("source_type"),
        parse_status,
        parse_error: row.get("parse_error"),
        transactions_found: row.get("transactions_found"),
        parsed_at: row.get("parsed_at"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_file(bucket: &str, hash: &str) -> NewStoredFile {
        NewStoredFile {
            disclosure_id: None,
            storage_bucket: bucket.to_string(),
            storage_path: format!("{bucket}/2024/01/test.pdf"),
            file_type: "pdf".to_string(),
            file_size_bytes: 1024,
            file_hash_sha256: hash.to_string(),
            mime_type: "application/pdf".to_string(),
            source_url: None,
            source_type: "house_pdf".to_string(),
            parse_status: ParseStatus::Pending,
            transactions_found: 0,
            expires_at: Utc::now() + Duration::days(365),
        }
    }

    #[tokio::test]
    async fn test_hash_lookup_and_dedup_constraint() {
        let db = TradewatchDb::in_memory().await.unwrap();

        let id = db.insert_stored_file(&sample_file("raw-pdfs", "abc123")).await.unwrap();
        let found = db
            .find_stored_file_by_hash("raw-pdfs", "abc123")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);

        // Same hash, same bucket: unique constraint fires.
        let err = db
            .insert_stored_file(&sample_file("raw-pdfs", "abc123"))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());

        // Same hash, different bucket: fine.
        db.insert_stored_file(&sample_file("api-responses", "abc123"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_parse_status_transitions() {
        let db = TradewatchDb::in_memory().await.unwrap();
        let id = db.insert_stored_file(&sample_file("raw-pdfs", "h1")).await.unwrap();

        let pending = db.files_to_parse("raw-pdfs", 10).await.unwrap();
        assert_eq!(pending.len(), 1);

        db.mark_file_parsed(&id, 7).await.unwrap();
        let file = db.get_stored_file(&id).await.unwrap();
        assert_eq!(file.parse_status, ParseStatus::Success);
        assert_eq!(file.transactions_found, 7);
        assert!(file.parsed_at.is_some());

        assert!(db.files_to_parse("raw-pdfs", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_failed_records_error() {
        let db = TradewatchDb::in_memory().await.unwrap();
        let id = db.insert_stored_file(&sample_file("raw-pdfs", "h2")).await.unwrap();

        db.mark_file_failed(&id, "no text layer").await.unwrap();
        let file = db.get_stored_file(&id).await.unwrap();
        assert_eq!(file.parse_status, ParseStatus::Failed);
        assert_eq!(file.parse_error.as_deref(), Some("no text layer"));
    }
}
