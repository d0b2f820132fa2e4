//! Storage manager: blob placement, metadata rows, dedup.

use crate::store::BlobStore;
use crate::Result;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, error, info};

use tradewatch_db::{NewStoredFile, ParseStatus, StoredFile, TradewatchDb};

pub const BUCKET_RAW_PDFS: &str = "raw-pdfs";
pub const BUCKET_API_RESPONSES: &str = "api-responses";
pub const BUCKET_PARSED_DATA: &str = "parsed-data";

/// Retention windows per bucket, in days.
const PDF_RETENTION_DAYS: i64 = 365;
const API_RETENTION_DAYS: i64 = 90;
const PARSED_RETENTION_DAYS: i64 = 730;

/// Politician names are truncated to this length inside filenames.
const NAME_COMPONENT_MAX: usize = 50;

/// Manages raw artifacts across buckets with content-hash dedup.
///
/// Shared by adapters (raw archival) and the normalize stage (parsed
/// intermediates). Cloning shares the store and the database handle.
#[derive(Clone)]
pub struct StorageManager {
    db: TradewatchDb,
    store: Arc<dyn BlobStore>,
}

impl StorageManager {
    pub fn new(db: TradewatchDb, store: Arc<dyn BlobStore>) -> Self {
        Self { db, store }
    }

    /// Save a disclosure PDF and its metadata row.
    ///
    /// Path format: `{chamber}/{YYYY}/{MM}/{disclosure_id}_{name}_{YYYYMMDD}.pdf`.
    /// If a file with the same hash already exists in the bucket, returns
    /// the existing `(path, file_id)` without re-uploading.
    pub async fn save_pdf(
        &self,
        pdf_content: &[u8],
        disclosure_id: &str,
        politician_name: &str,
        source_url: &str,
        transaction_date: NaiveDate,
        source_type: &str,
    ) -> Result<(String, String)> {
        let file_hash = sha256_hex(pdf_content);

        if let Some(existing) = self
            .db
            .find_stored_file_by_hash(BUCKET_RAW_PDFS, &file_hash)
            .await?
        {
            debug!(hash = %file_hash, file_id = %existing.id, "PDF already stored, reusing");
            return Ok((existing.storage_path, existing.id));
        }

        let chamber = if source_type.to_lowercase().contains("senate") {
            "senate"
        } else {
            "house"
        };
        let filename = format!(
            "{}_{}_{}.pdf",
            disclosure_id,
            sanitize_name_component(politician_name),
            transaction_date.format("%Y%m%d"),
        );
        let path = format!(
            "{}/{:04}/{:02}/{}",
            chamber,
            transaction_date.year(),
            transaction_date.month(),
            filename,
        );

        info!(%path, size = pdf_content.len(), "Saving PDF to storage");
        self.store.put(BUCKET_RAW_PDFS, &path, pdf_content).await?;

        // Metadata failures do not roll the blob back; the bucket is the
        // durable copy and the row can be backfilled.
        let file_id = match self
            .db
            .insert_stored_file(&NewStoredFile {
                disclosure_id: Some(disclosure_id.to_string()),
                storage_bucket: BUCKET_RAW_PDFS.to_string(),
                storage_path: path.clone(),
                file_type: "pdf".to_string(),
                file_size_bytes: pdf_content.len() as i64,
                file_hash_sha256: file_hash,
                mime_type: "application/pdf".to_string(),
                source_url: Some(source_url.to_string()),
                source_type: source_type.to_string(),
                parse_status: ParseStatus::Pending,
                transactions_found: 0,
                expires_at: Utc::now() + Duration::days(PDF_RETENTION_DAYS),
            })
            .await
        {
            Ok(id) => id,
            Err(e) => {
                error!(error = %e, %path, "PDF uploaded but metadata insert failed");
                return Err(e.into());
            }
        };

        if let Err(e) = self
            .db
            .set_disclosure_source_file(disclosure_id, &file_id)
            .await
        {
            error!(error = %e, %disclosure_id, "Failed to link PDF to disclosure");
        }

        Ok((path, file_id))
    }

    /// Save a raw API response payload.
    ///
    /// Path format: `{source}/{YYYY}/{MM}/{DD}/batch_{YYYYMMDD_HHMMSS}.json`.
    pub async fn save_api_response(
        &self,
        payload: &serde_json::Value,
        source: &str,
        endpoint: &str,
        source_url: Option<&str>,
    ) -> Result<(String, String)> {
        let now = Utc::now();
        let path = format!(
            "{}/{}/batch_{}.json",
            source,
            now.format("%Y/%m/%d"),
            now.format("%Y%m%d_%H%M%S"),
        );

        let json_bytes = serde_json::to_vec_pretty(payload)?;
        let file_hash = sha256_hex(&json_bytes);

        if let Some(existing) = self
            .db
            .find_stored_file_by_hash(BUCKET_API_RESPONSES, &file_hash)
            .await?
        {
            debug!(hash = %file_hash, "Identical API response already archived");
            return Ok((existing.storage_path, existing.id));
        }

        info!(%path, %endpoint, size = json_bytes.len(), "Saving API response to storage");
        self.store.put(BUCKET_API_RESPONSES, &path, &json_bytes).await?;

        let record_count = count_records(payload);

        let file_id = self
            .db
            .insert_stored_file(&NewStoredFile {
                disclosure_id: None,
                storage_bucket: BUCKET_API_RESPONSES.to_string(),
                storage_path: path.clone(),
                file_type: "json".to_string(),
                file_size_bytes: json_bytes.len() as i64,
                file_hash_sha256: file_hash,
                mime_type: "application/json".to_string(),
                source_url: source_url.map(str::to_string),
                source_type: format!("{source}_api"),
                parse_status: ParseStatus::Pending,
                transactions_found: record_count,
                expires_at: Utc::now() + Duration::days(API_RETENTION_DAYS),
            })
            .await?;

        info!(%file_id, records = record_count, "API response metadata saved");
        Ok((path, file_id))
    }

    /// Save parsed intermediate data, linked back to its source file when
    /// one exists.
    pub async fn save_parsed_data(
        &self,
        payload: &serde_json::Value,
        source_file_id: Option<&str>,
        disclosure_id: Option<&str>,
    ) -> Result<(String, String)> {
        let now = Utc::now();
        let filename = match disclosure_id {
            Some(id) => format!("{}_parsed_{}.json", id, now.format("%Y%m%d_%H%M%S")),
            None => format!("batch_parsed_{}.json", now.format("%Y%m%d_%H%M%S")),
        };
        let path = format!("parsed/{}/{}", now.format("%Y/%m/%d"), filename);

        let json_bytes = serde_json::to_vec_pretty(payload)?;
        let file_hash = sha256_hex(&json_bytes);

        if let Some(existing) = self
            .db
            .find_stored_file_by_hash(BUCKET_PARSED_DATA, &file_hash)
            .await?
        {
            return Ok((existing.storage_path, existing.id));
        }

        self.store.put(BUCKET_PARSED_DATA, &path, &json_bytes).await?;

        let file_id = self
            .db
            .insert_stored_file(&NewStoredFile {
                disclosure_id: disclosure_id.map(str::to_string),
                storage_bucket: BUCKET_PARSED_DATA.to_string(),
                storage_path: path.clone(),
                file_type: "json".to_string(),
                file_size_bytes: json_bytes.len() as i64,
                file_hash_sha256: file_hash,
                mime_type: "application/json".to_string(),
                source_url: None,
                source_type: "parsed_data".to_string(),
                parse_status: ParseStatus::Success,
                transactions_found: 0,
                expires_at: Utc::now() + Duration::days(PARSED_RETENTION_DAYS),
            })
            .await?;

        debug!(%file_id, ?source_file_id, "Parsed data saved");

        if let Some(disclosure_id) = disclosure_id {
            if let Err(e) = self.db.set_disclosure_parsed_data(disclosure_id).await {
                error!(error = %e, %disclosure_id, "Failed to flag parsed data on disclosure");
            }
        }

        Ok((path, file_id))
    }

    /// Retrieve a PDF by its storage path.
    pub async fn get_pdf(&self, storage_path: &str) -> Result<Vec<u8>> {
        self.store.get(BUCKET_RAW_PDFS, storage_path).await
    }

    /// Retrieve an archived API response by its storage path.
    pub async fn get_api_response(&self, storage_path: &str) -> Result<serde_json::Value> {
        let bytes = self.store.get(BUCKET_API_RESPONSES, storage_path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn mark_file_parsed(&self, file_id: &str, transactions_count: i64) -> Result<()> {
        self.db.mark_file_parsed(file_id, transactions_count).await?;
        info!(%file_id, transactions_count, "File marked as parsed");
        Ok(())
    }

    pub async fn mark_file_failed(&self, file_id: &str, error_message: &str) -> Result<()> {
        self.db.mark_file_failed(file_id, error_message).await?;
        info!(%file_id, "File marked as failed");
        Ok(())
    }

    /// Files awaiting parsing, oldest first.
    pub async fn get_files_to_parse(&self, bucket: &str, limit: i64) -> Result<Vec<StoredFile>> {
        Ok(self.db.files_to_parse(bucket, limit).await?)
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Keep alphanumerics, spaces, and dashes; spaces become underscores.
fn sanitize_name_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-')
        .collect();
    let underscored = cleaned.replace(' ', "_");
    underscored.chars().take(NAME_COMPONENT_MAX).collect()
}

/// Count records in an archived payload by probing common list keys.
fn count_records(payload: &serde_json::Value) -> i64 {
    match payload {
        serde_json::Value::Array(items) => items.len() as i64,
        serde_json::Value::Object(map) => {
            for key in ["data", "trades", "results", "records"] {
                if let Some(serde_json::Value::Array(items)) = map.get(key) {
                    return items.len() as i64;
                }
            }
            0
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FsBlobStore;

    async fn manager() -> (StorageManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = TradewatchDb::in_memory().await.unwrap();
        let store = Arc::new(FsBlobStore::new(dir.path().to_path_buf()));
        (StorageManager::new(db, store), dir)
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[tokio::test]
    async fn test_pdf_path_format() {
        let (manager, _dir) = manager().await;

        let (path, _) = manager
            .save_pdf(b"%PDF-1.4 test", "d-1", "Nancy Pelosi", "https://x/doc.pdf", date(), "house_pdf")
            .await
            .unwrap();

        assert_eq!(path, "house/2024/01/d-1_Nancy_Pelosi_20240115.pdf");
    }

    #[tokio::test]
    async fn test_senate_chamber_in_path() {
        let (manager, _dir) = manager().await;

        let (path, _) = manager
            .save_pdf(b"%PDF-1.4 s", "d-2", "Jon Tester", "https://x", date(), "senate_pdf")
            .await
            .unwrap();

        assert!(path.starts_with("senate/2024/01/"));
    }

    #[tokio::test]
    async fn test_identical_bytes_dedup_to_one_row() {
        let (manager, _dir) = manager().await;

        let (path1, id1) = manager
            .save_pdf(b"%PDF-1.4 same", "d-1", "A B", "https://x", date(), "house_pdf")
            .await
            .unwrap();
        let (path2, id2) = manager
            .save_pdf(b"%PDF-1.4 same", "d-2", "C D", "https://x", date(), "house_pdf")
            .await
            .unwrap();

        assert_eq!(id1, id2);
        assert_eq!(path1, path2);
    }

    #[tokio::test]
    async fn test_api_response_record_count() {
        let (manager, _dir) = manager().await;

        let payload = serde_json::json!({"trades": [{"Ticker": "FB"}, {"Ticker": "AAPL"}]});
        let (path, file_id) = manager
            .save_api_response(&payload, "quiverquant", "/congresstrading", None)
            .await
            .unwrap();

        assert!(path.starts_with("quiverquant/"));
        let files = manager.get_files_to_parse(BUCKET_API_RESPONSES, 10).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, file_id);
        assert_eq!(files[0].transactions_found, 2);
    }

    #[tokio::test]
    async fn test_sanitize_name_component() {
        assert_eq!(sanitize_name_component("Nancy Pelosi"), "Nancy_Pelosi");
        assert_eq!(sanitize_name_component("O'Brien, Jr."), "OBrien_Jr");
        let long = "A".repeat(80);
        assert_eq!(sanitize_name_component(&long).len(), NAME_COMPONENT_MAX);
    }

    #[tokio::test]
    async fn test_count_records_probes_keys() {
        assert_eq!(count_records(&serde_json::json!([1, 2, 3])), 3);
        assert_eq!(count_records(&serde_json::json!({"data": [1]})), 1);
        assert_eq!(count_records(&serde_json::json!({"results": [1, 2]})), 2);
        assert_eq!(count_records(&serde_json::json!({"other": [1, 2]})), 0);
    }
}
