//! Cleaning stage: validate, dedup, and scrub raw disclosures.

use crate::ingest::elapsed_seconds;
use crate::stage::PipelineStage;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use tradewatch_protocol::types::raw_str;
use tradewatch_protocol::{
    parse_disclosure_date, CleanedDisclosure, PipelineContext, PipelineMetrics, PipelineResult,
    PipelineStatus, RawDisclosure, TransactionType,
};

/// Fields a raw record must carry to survive cleaning.
const REQUIRED_FIELDS: &[&str] = &[
    "politician_name",
    "transaction_date",
    "disclosure_date",
    "asset_name",
    "transaction_type",
];

/// Disclosures are normally filed within 45 days; past this window the
/// record is flagged but still kept.
const LATE_FILING_GRACE_DAYS: i64 = 90;

pub struct CleaningStage {
    pub remove_duplicates: bool,
    pub strict_validation: bool,
}

impl CleaningStage {
    pub fn new() -> Self {
        Self {
            remove_duplicates: true,
            strict_validation: false,
        }
    }

    pub fn strict(mut self) -> Self {
        self.strict_validation = true;
        self
    }

    fn has_required_fields(raw: &RawDisclosure) -> Vec<&'static str> {
        REQUIRED_FIELDS
            .iter()
            .filter(|field| raw_str(&raw.raw_data, field).is_none())
            .copied()
            .collect()
    }

    /// Stable fingerprint over the identity fields for in-run dedup.
    fn record_fingerprint(raw: &RawDisclosure) -> String {
        let key_fields = [
            raw_str(&raw.raw_data, "politician_name").unwrap_or_default(),
            raw_str(&raw.raw_data, "transaction_date").unwrap_or_default(),
            raw_str(&raw.raw_data, "asset_name").unwrap_or_default(),
            raw_str(&raw.raw_data, "transaction_type").unwrap_or_default(),
            raw_str(&raw.raw_data, "amount").unwrap_or_default(),
        ];
        let mut hasher = Sha256::new();
        hasher.update(key_fields.join("|").as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn clean_record(&self, raw: &RawDisclosure) -> Option<(CleanedDisclosure, Vec<String>)> {
        let mut warnings = Vec::new();

        let politician_name = clean_text(&raw_str(&raw.raw_data, "politician_name")?)?;
        let asset_name = clean_text(&raw_str(&raw.raw_data, "asset_name")?)?;

        let transaction_date =
            parse_disclosure_date(&raw_str(&raw.raw_data, "transaction_date")?)?;
        let disclosure_date =
            parse_disclosure_date(&raw_str(&raw.raw_data, "disclosure_date")?)?;

        if transaction_date > disclosure_date + Duration::days(LATE_FILING_GRACE_DAYS) {
            warnings.push(format!(
                "{politician_name}: transaction {transaction_date} postdates disclosure {disclosure_date} by more than {LATE_FILING_GRACE_DAYS} days"
            ));
        }

        let raw_type = raw_str(&raw.raw_data, "transaction_type")?;
        let transaction_type = TransactionType::normalize(&raw_type);
        if self.strict_validation && TransactionType::parse(&transaction_type).is_none() {
            warn!(%raw_type, "Rejecting unknown transaction type under strict validation");
            return None;
        }

        let asset_ticker = raw_str(&raw.raw_data, "asset_ticker").and_then(|t| clean_text(&t));
        let asset_type = raw_str(&raw.raw_data, "asset_type").and_then(|t| clean_text(&t));
        let amount_text = raw_str(&raw.raw_data, "amount").and_then(|t| clean_text(&t));

        Some((
            CleanedDisclosure {
                source: raw.source.clone(),
                politician_name,
                transaction_date,
                disclosure_date,
                asset_name,
                transaction_type,
                raw_data: raw.raw_data.clone(),
                asset_ticker,
                asset_type,
                amount_text,
                source_url: raw.source_url.clone(),
                source_document_id: raw.source_document_id.clone(),
            },
            warnings,
        ))
    }
}

impl Default for CleaningStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineStage<RawDisclosure, CleanedDisclosure> for CleaningStage {
    fn name(&self) -> &'static str {
        "cleaning"
    }

    async fn process(
        &self,
        data: Vec<RawDisclosure>,
        _context: &PipelineContext,
    ) -> PipelineResult<CleanedDisclosure> {
        let started = Utc::now();
        let mut metrics = PipelineMetrics::default();
        let mut cleaned = Vec::new();
        let mut seen_fingerprints: HashSet<String> = HashSet::new();

        metrics.records_input = data.len() as u64;
        info!(count = data.len(), "Starting cleaning");

        for (index, raw) in data.iter().enumerate() {
            let missing = Self::has_required_fields(raw);
            if !missing.is_empty() {
                warn!(record = index, ?missing, "Record missing required fields");
                metrics.records_skipped += 1;
                metrics
                    .warnings
                    .push(format!("Record {index}: missing fields {missing:?}"));
                continue;
            }

            if self.remove_duplicates {
                let fingerprint = Self::record_fingerprint(raw);
                if !seen_fingerprints.insert(fingerprint) {
                    debug!(record = index, "Duplicate record, skipping");
                    metrics.records_skipped += 1;
                    continue;
                }
            }

            match self.clean_record(raw) {
                Some((record, warnings)) => {
                    metrics.warnings.extend(warnings);
                    cleaned.push(record);
                    metrics.records_output += 1;
                }
                None => {
                    metrics.records_failed += 1;
                    metrics.errors.push(format!("Record {index}: cleaning failed"));
                }
            }
        }

        metrics.duration_seconds = elapsed_seconds(started);
        let status = PipelineStatus::from_counts(
            metrics.records_output,
            metrics.records_failed,
            metrics.records_skipped,
            true,
        );
        if status == PipelineStatus::Failed {
            metrics.errors.push("No records successfully cleaned".to_string());
        }

        info!(
            cleaned = metrics.records_output,
            skipped = metrics.records_skipped,
            failed = metrics.records_failed,
            duration = metrics.duration_seconds,
            "Cleaning complete"
        );

        PipelineResult::new(self.name(), status, cleaned, metrics)
    }
}

/// Trim, collapse internal whitespace, and strip null bytes.
fn clean_text(text: &str) -> Option<String> {
    let stripped = text.replace('\0', "");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tradewatch_protocol::RawRecord;

    fn raw(record: serde_json::Value) -> RawDisclosure {
        let map: RawRecord = record.as_object().unwrap().clone();
        RawDisclosure::new("QuiverQuant", "quiverquant", map)
    }

    fn complete_record() -> serde_json::Value {
        json!({
            "politician_name": "Nancy Pelosi",
            "transaction_date": "2024-01-15",
            "disclosure_date": "2024-01-20",
            "asset_name": "Apple Inc",
            "transaction_type": "Buy",
            "amount": "$1,001 - $15,000"
        })
    }

    fn ctx() -> PipelineContext {
        PipelineContext::new("QuiverQuant", "quiverquant")
    }

    #[tokio::test]
    async fn test_clean_happy_path_maps_synonyms() {
        let stage = CleaningStage::new();
        let result = stage.process(vec![raw(complete_record())], &ctx()).await;

        assert_eq!(result.status, PipelineStatus::Success);
        assert_eq!(result.data.len(), 1);
        let record = &result.data[0];
        assert_eq!(record.transaction_type, "purchase");
        assert_eq!(record.amount_text.as_deref(), Some("$1,001 - $15,000"));
    }

    #[tokio::test]
    async fn test_missing_required_field_is_skipped() {
        let stage = CleaningStage::new();
        let mut incomplete = complete_record();
        incomplete.as_object_mut().unwrap().remove("asset_name");

        let result = stage.process(vec![raw(incomplete)], &ctx()).await;
        assert_eq!(result.status, PipelineStatus::Failed);
        assert_eq!(result.metrics.records_skipped, 1);
        assert!(result.data.is_empty());
    }

    #[tokio::test]
    async fn test_duplicates_thinned_to_one() {
        let stage = CleaningStage::new();
        let result = stage
            .process(vec![raw(complete_record()), raw(complete_record())], &ctx())
            .await;

        assert_eq!(result.data.len(), 1);
        assert_eq!(result.metrics.records_skipped, 1);
        assert_eq!(result.status, PipelineStatus::PartialSuccess);
    }

    #[tokio::test]
    async fn test_duplicates_kept_when_disabled() {
        let mut stage = CleaningStage::new();
        stage.remove_duplicates = false;
        let result = stage
            .process(vec![raw(complete_record()), raw(complete_record())], &ctx())
            .await;
        assert_eq!(result.data.len(), 2);
    }

    #[tokio::test]
    async fn test_unparseable_date_fails_record() {
        let stage = CleaningStage::new();
        let mut bad = complete_record();
        bad["transaction_date"] = json!("not a date");

        let result = stage.process(vec![raw(bad)], &ctx()).await;
        assert_eq!(result.metrics.records_failed, 1);
        assert!(result.data.is_empty());
    }

    #[tokio::test]
    async fn test_strict_validation_rejects_unknown_type() {
        let mut gift = complete_record();
        gift["transaction_type"] = json!("gift");

        let lenient = CleaningStage::new();
        let result = lenient.process(vec![raw(gift.clone())], &ctx()).await;
        assert_eq!(result.data.len(), 1);
        assert_eq!(result.data[0].transaction_type, "gift");

        let strict = CleaningStage::new().strict();
        let result = strict.process(vec![raw(gift)], &ctx()).await;
        assert!(result.data.is_empty());
        assert_eq!(result.metrics.records_failed, 1);
    }

    #[tokio::test]
    async fn test_late_transaction_warns_but_keeps() {
        let stage = CleaningStage::new();
        let mut late = complete_record();
        // Transaction dated long after the disclosure.
        late["transaction_date"] = json!("2024-09-15");
        late["disclosure_date"] = json!("2024-01-20");

        let result = stage.process(vec![raw(late)], &ctx()).await;
        assert_eq!(result.data.len(), 1);
        assert!(result
            .metrics
            .warnings
            .iter()
            .any(|w| w.contains("postdates")));
    }

    #[tokio::test]
    async fn test_whitespace_and_null_bytes_scrubbed() {
        let stage = CleaningStage::new();
        let mut messy = complete_record();
        messy["politician_name"] = json!("  Nancy \u{0}  Pelosi ");

        let result = stage.process(vec![raw(messy)], &ctx()).await;
        assert_eq!(result.data[0].politician_name, "Nancy Pelosi");
    }
}
