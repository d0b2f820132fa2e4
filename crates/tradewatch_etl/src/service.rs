//! The ETL service contract and its `run()` driver.

use crate::result::{EtlResult, JobProgress};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

use tradewatch_protocol::types::raw_str;
use tradewatch_protocol::{parse_disclosure_date, RawRecord};
use tradewatch_db::{NewDisclosure, Politician, TradewatchDb};

/// A per-source ETL service.
///
/// Implementors supply `source_id`/`source_name`, fetching, and parsing;
/// validation and upload have defaults built on the shared publisher
/// semantics. The `run()` driver orders the lifecycle and keeps a live
/// progress entry per job id.
#[async_trait]
pub trait EtlService: Send + Sync {
    fn source_id(&self) -> &'static str;
    fn source_name(&self) -> &'static str;

    /// Live job-status store. Implementors hold one `JobStatusStore`.
    fn status_store(&self) -> &JobStatusStore;

    /// Database handle used by the default upload path.
    fn db(&self) -> &TradewatchDb;

    /// Fetch raw disclosures from the source.
    async fn fetch_disclosures(
        &self,
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Vec<RawRecord>, String>;

    /// Parse one raw disclosure into the standardized record shape.
    /// Returning None skips the record.
    async fn parse_disclosure(&self, raw: &RawRecord) -> Option<RawRecord>;

    /// Validate a parsed disclosure. Default: a non-empty asset name.
    async fn validate_disclosure(&self, parsed: &RawRecord) -> bool {
        raw_str(parsed, "asset_name").is_some()
    }

    /// Upload one disclosure. Default: find-or-create the politician,
    /// then insert (or update when `update_mode`), using the shared
    /// idempotence key. Returns the disclosure id, or None when skipped.
    async fn upload_disclosure(&self, parsed: &RawRecord, update_mode: bool) -> Option<String> {
        let db = self.db();

        let politician_name = raw_str(parsed, "politician_name")?;
        let (first, last) = split_name(&politician_name);
        let role = raw_str(parsed, "role").unwrap_or_else(|| "UNKNOWN".to_string());

        let politician = Politician::new(&first, &last, &role)
            .with_full_name(&politician_name)
            .with_state(raw_str(parsed, "state"))
            .with_bioguide_id(raw_str(parsed, "bioguide_id"))
            .with_source(self.source_id());
        let (politician_id, _created) = db.upsert_politician(&politician).await.ok()?;

        let transaction_date = parse_disclosure_date(&raw_str(parsed, "transaction_date")?)?;
        let disclosure_date = parse_disclosure_date(&raw_str(parsed, "disclosure_date")?)?;
        let asset_name = raw_str(parsed, "asset_name")?;
        let transaction_type = raw_str(parsed, "transaction_type")?;

        if update_mode {
            if let Ok(Some(existing)) = db
                .find_disclosure(&politician_id, transaction_date, &asset_name, &transaction_type)
                .await
            {
                let update = tradewatch_db::DisclosureUpdate {
                    asset_ticker: raw_str(parsed, "asset_ticker"),
                    asset_type: raw_str(parsed, "asset_type"),
                    amount_range_min: parsed.get("amount_min").and_then(|v| v.as_f64()),
                    amount_range_max: parsed.get("amount_max").and_then(|v| v.as_f64()),
                    amount_exact: parsed.get("amount_exact").and_then(|v| v.as_f64()),
                    source_url: raw_str(parsed, "source_url"),
                    raw_data: serde_json::Value::Object(parsed.clone()),
                };
                return match db.update_disclosure(&existing.id, &update).await {
                    Ok(true) => Some(existing.id),
                    _ => None,
                };
            }
        }

        let new = NewDisclosure {
            politician_id,
            transaction_date,
            disclosure_date,
            transaction_type,
            asset_name,
            asset_ticker: raw_str(parsed, "asset_ticker"),
            asset_type: raw_str(parsed, "asset_type"),
            amount_range_min: parsed.get("amount_min").and_then(|v| v.as_f64()),
            amount_range_max: parsed.get("amount_max").and_then(|v| v.as_f64()),
            amount_exact: parsed.get("amount_exact").and_then(|v| v.as_f64()),
            source: Some(self.source_id().to_string()),
            source_url: raw_str(parsed, "source_url"),
            source_document_id: raw_str(parsed, "document_id"),
            raw_data: serde_json::Value::Object(parsed.clone()),
        };

        match db.insert_disclosure(&new).await {
            Ok(id) => Some(id),
            Err(e) if e.is_unique_violation() => None,
            Err(_) => None,
        }
    }

    /// Hook called before processing begins.
    async fn on_start(&self, job_id: &str) {
        info!(source = self.source_name(), job_id, "Starting ETL job");
    }

    /// Hook called after processing completes.
    async fn on_complete(&self, job_id: &str, result: &EtlResult) {
        info!(
            source = self.source_name(),
            job_id,
            inserted = result.records_inserted,
            failed = result.records_failed,
            "Completed ETL job"
        );
    }

    /// Execute the standard ETL flow: fetch, then per record
    /// parse/validate/upload, with progress updates throughout.
    async fn run(
        &self,
        job_id: &str,
        limit: Option<usize>,
        update_mode: bool,
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> EtlResult {
        let mut result = EtlResult::started_now();

        self.status_store().update(job_id, |status| {
            status.status = "running".to_string();
            status.started_at = Some(Utc::now());
            status.message = format!("Starting {} ETL...", self.source_name());
        });

        self.on_start(job_id).await;

        self.status_store().update(job_id, |status| {
            status.message = "Fetching disclosures...".to_string();
        });

        let raw_disclosures = match self.fetch_disclosures(params).await {
            Ok(raw) => raw,
            Err(e) => {
                result.add_error(format!("ETL job failed: {e}"));
                result.completed_at = Some(Utc::now());
                self.status_store().update(job_id, |status| {
                    status.status = "failed".to_string();
                    status.completed_at = Some(Utc::now());
                    status.message = format!("Failed: {e}");
                });
                return result;
            }
        };

        if raw_disclosures.is_empty() {
            result.add_warning("No disclosures fetched from source");
            result.completed_at = Some(Utc::now());
            self.status_store().update(job_id, |status| {
                status.status = "completed".to_string();
                status.completed_at = Some(Utc::now());
                status.message = "No disclosures to process".to_string();
            });
            return result;
        }

        let to_process: Vec<_> = match limit {
            Some(limit) => raw_disclosures.into_iter().take(limit).collect(),
            None => raw_disclosures,
        };
        let total = to_process.len() as u64;
        self.status_store().update(job_id, |status| {
            status.total = Some(total);
        });

        info!(total, source = self.source_id(), "Processing disclosures");

        for (index, raw) in to_process.iter().enumerate() {
            result.records_processed += 1;
            self.status_store().update(job_id, |status| {
                status.progress = (index + 1) as u64;
                status.message = format!("Processing {}/{}...", index + 1, total);
            });

            let Some(parsed) = self.parse_disclosure(raw).await else {
                result.records_skipped += 1;
                continue;
            };

            if !self.validate_disclosure(&parsed).await {
                result.records_skipped += 1;
                continue;
            }

            match self.upload_disclosure(&parsed, update_mode).await {
                Some(_id) => {
                    if update_mode {
                        result.records_updated += 1;
                    } else {
                        result.records_inserted += 1;
                    }
                }
                None => result.records_skipped += 1,
            }
        }

        result.completed_at = Some(Utc::now());

        let message = format!(
            "Completed: {} inserted, {} updated, {} failed",
            result.records_inserted, result.records_updated, result.records_failed
        );
        let final_result = result.clone();
        self.status_store().update(job_id, |status| {
            status.status = "completed".to_string();
            status.completed_at = Some(Utc::now());
            status.message = message.clone();
            status.result = Some(final_result.clone());
        });

        self.on_complete(job_id, &result).await;
        result
    }
}

/// Shared in-memory job-progress store.
#[derive(Default)]
pub struct JobStatusStore {
    statuses: Mutex<HashMap<String, JobProgress>>,
}

impl JobStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, job_id: &str) -> Option<JobProgress> {
        self.statuses.lock().ok()?.get(job_id).cloned()
    }

    pub fn update(&self, job_id: &str, apply: impl FnOnce(&mut JobProgress)) {
        if let Ok(mut statuses) = self.statuses.lock() {
            let status = statuses.entry(job_id.to_string()).or_default();
            apply(status);
        }
    }
}

fn split_name(full_name: &str) -> (String, String) {
    let parts: Vec<&str> = full_name.split_whitespace().collect();
    match parts.len() {
        0 => (String::new(), String::new()),
        1 => (parts[0].to_string(), String::new()),
        _ => (parts[0].to_string(), parts[parts.len() - 1].to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FakeService {
        db: TradewatchDb,
        status: JobStatusStore,
        rows: Vec<RawRecord>,
        fail_fetch: bool,
    }

    #[async_trait]
    impl EtlService for FakeService {
        fn source_id(&self) -> &'static str {
            "fake"
        }
        fn source_name(&self) -> &'static str {
            "Fake Source"
        }
        fn status_store(&self) -> &JobStatusStore {
            &self.status
        }
        fn db(&self) -> &TradewatchDb {
            &self.db
        }

        async fn fetch_disclosures(
            &self,
            _params: &serde_json::Map<String, serde_json::Value>,
        ) -> Result<Vec<RawRecord>, String> {
            if self.fail_fetch {
                Err("source unreachable".to_string())
            } else {
                Ok(self.rows.clone())
            }
        }

        async fn parse_disclosure(&self, raw: &RawRecord) -> Option<RawRecord> {
            if raw.contains_key("unparseable") {
                None
            } else {
                Some(raw.clone())
            }
        }
    }

    fn record(asset: &str) -> RawRecord {
        json!({
            "politician_name": "Nancy Pelosi",
            "role": "Representative",
            "transaction_date": "2024-01-15",
            "disclosure_date": "2024-01-20",
            "asset_name": asset,
            "transaction_type": "purchase"
        })
        .as_object()
        .unwrap()
        .clone()
    }

    async fn service(rows: Vec<RawRecord>, fail_fetch: bool) -> FakeService {
        FakeService {
            db: TradewatchDb::in_memory().await.unwrap(),
            status: JobStatusStore::new(),
            rows,
            fail_fetch,
        }
    }

    #[tokio::test]
    async fn test_run_inserts_and_tracks_status() {
        let service = service(vec![record("Apple Inc"), record("Tesla Inc")], false).await;
        let result = service
            .run("job-1", None, false, &serde_json::Map::new())
            .await;

        assert!(result.is_success());
        assert_eq!(result.records_processed, 2);
        assert_eq!(result.records_inserted, 2);
        assert_eq!(service.db.count_disclosures().await.unwrap(), 2);

        let status = service.status_store().get("job-1").unwrap();
        assert_eq!(status.status, "completed");
        assert_eq!(status.progress, 2);
        assert_eq!(status.total, Some(2));
    }

    #[tokio::test]
    async fn test_unparseable_records_are_skipped() {
        let mut bad = record("ignored");
        bad.insert("unparseable".to_string(), json!(true));

        let service = service(vec![record("Apple Inc"), bad], false).await;
        let result = service
            .run("job-2", None, false, &serde_json::Map::new())
            .await;

        assert_eq!(result.records_inserted, 1);
        assert_eq!(result.records_skipped, 1);
    }

    #[tokio::test]
    async fn test_duplicate_upload_counts_as_skip() {
        let service = service(vec![record("Apple Inc"), record("Apple Inc")], false).await;
        let result = service
            .run("job-3", None, false, &serde_json::Map::new())
            .await;

        assert_eq!(result.records_inserted, 1);
        assert_eq!(result.records_skipped, 1);
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_empty_fetch_warns_and_completes() {
        let service = service(Vec::new(), false).await;
        let result = service
            .run("job-4", None, false, &serde_json::Map::new())
            .await;

        assert!(result.is_success());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(service.status_store().get("job-4").unwrap().status, "completed");
    }

    #[tokio::test]
    async fn test_fetch_failure_marks_job_failed() {
        let service = service(Vec::new(), true).await;
        let result = service
            .run("job-5", None, false, &serde_json::Map::new())
            .await;

        assert!(!result.is_success());
        assert_eq!(service.status_store().get("job-5").unwrap().status, "failed");
    }

    #[tokio::test]
    async fn test_limit_truncates() {
        let service = service(
            vec![record("A"), record("B"), record("C")],
            false,
        )
        .await;
        let result = service
            .run("job-6", Some(2), false, &serde_json::Map::new())
            .await;
        assert_eq!(result.records_processed, 2);
    }
}
