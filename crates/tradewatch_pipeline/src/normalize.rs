//! Normalization stage: resolve politicians, tickers, asset types, and
//! amounts on cleaned disclosures.

use crate::ingest::elapsed_seconds;
use crate::stage::PipelineStage;
use crate::transformers::matcher::infer_role_from_source;
use crate::transformers::{AmountParser, PoliticianMatcher, TickerExtractor};
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{info, warn};

use tradewatch_protocol::types::raw_str;
use tradewatch_protocol::{
    AssetType, CleanedDisclosure, NormalizedDisclosure, PipelineContext, PipelineMetrics,
    PipelineResult, PipelineStatus,
};
use tradewatch_db::TradewatchDb;
use tradewatch_storage::StorageManager;

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^((Sen\.|Senator|Rep\.|Representative|Hon\.|Honorable|Mr\.|Mrs\.|Ms\.|Dr\.)\s+|(The\s+)?(Right\s+)?Honourable\s+)+",
        )
        .unwrap()
    })
}

pub struct NormalizationStage {
    matcher: PoliticianMatcher,
    ticker_extractor: TickerExtractor,
    amount_parser: AmountParser,
    storage: Option<StorageManager>,
}

impl NormalizationStage {
    pub fn new(db: Option<TradewatchDb>) -> Self {
        Self {
            matcher: PoliticianMatcher::new(db),
            ticker_extractor: TickerExtractor::new(),
            amount_parser: AmountParser::new(),
            storage: None,
        }
    }

    pub fn with_storage(mut self, storage: Option<StorageManager>) -> Self {
        self.storage = storage;
        self
    }

    async fn normalize_record(&self, cleaned: &CleanedDisclosure) -> NormalizedDisclosure {
        let (first_name, last_name) = parse_politician_name(&cleaned.politician_name);

        let outcome = self
            .matcher
            .match_politician(&first_name, &last_name, &cleaned.source)
            .await;

        // An unmatched politician takes the chamber from the record when
        // the source carries one (QuiverQuant mixes both chambers).
        let role = if outcome.politician_id.is_none() {
            match raw_str(&cleaned.raw_data, "chamber") {
                Some(chamber) => infer_role_from_source(&chamber),
                None => outcome.role.clone(),
            }
        } else {
            outcome.role.clone()
        };

        let state = outcome.state.clone().or_else(|| {
            raw_str(&cleaned.raw_data, "state").or_else(|| {
                raw_str(&cleaned.raw_data, "state_district").and_then(|district| {
                    let prefix: String = district.chars().take(2).collect();
                    if prefix.len() == 2 && prefix.chars().all(|c| c.is_ascii_uppercase()) {
                        Some(prefix)
                    } else {
                        None
                    }
                })
            })
        });

        let asset_ticker = cleaned
            .asset_ticker
            .as_deref()
            .map(TickerExtractor::canonicalize)
            .or_else(|| self.ticker_extractor.extract(&cleaned.asset_name));

        let asset_type = cleaned.asset_type.clone().and_then(|t| {
            let lowered = t.to_lowercase();
            AssetType::parse(&lowered).map(|a| a.as_str().to_string())
        });
        let asset_type = asset_type.unwrap_or_else(|| {
            AssetType::infer(&cleaned.asset_name, asset_ticker.is_some())
                .as_str()
                .to_string()
        });

        let (amount_min, amount_max, amount_exact) =
            self.amount_parser.parse(cleaned.amount_text.as_deref());

        NormalizedDisclosure {
            politician_id: outcome.politician_id,
            politician_first_name: first_name,
            politician_last_name: last_name,
            politician_full_name: cleaned.politician_name.clone(),
            politician_role: role,
            politician_party: outcome.party,
            politician_state: state,
            transaction_date: cleaned.transaction_date,
            disclosure_date: cleaned.disclosure_date,
            transaction_type: cleaned.transaction_type.to_lowercase(),
            asset_name: cleaned.asset_name.clone(),
            asset_ticker,
            asset_type: Some(asset_type),
            amount_range_min: amount_min,
            amount_range_max: amount_max,
            amount_exact,
            source: cleaned.source.clone(),
            source_url: cleaned.source_url.clone(),
            source_document_id: cleaned.source_document_id.clone(),
            raw_data: cleaned.raw_data.clone(),
            processed_at: Utc::now(),
        }
    }
}

#[async_trait]
impl PipelineStage<CleanedDisclosure, NormalizedDisclosure> for NormalizationStage {
    fn name(&self) -> &'static str {
        "normalization"
    }

    async fn process(
        &self,
        data: Vec<CleanedDisclosure>,
        context: &PipelineContext,
    ) -> PipelineResult<NormalizedDisclosure> {
        let started = Utc::now();
        let mut metrics = PipelineMetrics::default();
        let mut normalized = Vec::with_capacity(data.len());

        metrics.records_input = data.len() as u64;
        info!(count = data.len(), source = %context.source_name, "Starting normalization");

        for cleaned in &data {
            normalized.push(self.normalize_record(cleaned).await);
            metrics.records_output += 1;
        }

        // Persist the parsed batch as intermediate data for reprocessing.
        if let Some(storage) = &self.storage {
            if !normalized.is_empty() {
                match serde_json::to_value(&normalized) {
                    Ok(payload) => {
                        if let Err(e) = storage.save_parsed_data(&payload, None, None).await {
                            warn!(error = %e, "Failed to archive normalized batch");
                            metrics
                                .warnings
                                .push(format!("parsed-data archival failed: {e}"));
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to serialize normalized batch"),
                }
            }
        }

        metrics.duration_seconds = elapsed_seconds(started);
        let status = PipelineStatus::from_counts(
            metrics.records_output,
            metrics.records_failed,
            metrics.records_skipped,
            false,
        );
        if status == PipelineStatus::Failed {
            metrics.errors.push("No records successfully normalized".to_string());
        }

        info!(
            normalized = metrics.records_output,
            failed = metrics.records_failed,
            duration = metrics.duration_seconds,
            "Normalization complete"
        );

        PipelineResult::new(self.name(), status, normalized, metrics)
    }
}

/// Strip titles, then split: one token is a first name only, two are
/// first/last, three or more keep the first and last tokens.
pub fn parse_politician_name(full_name: &str) -> (String, String) {
    let stripped = title_re().replace(full_name.trim(), "");
    let parts: Vec<&str> = stripped.split_whitespace().collect();

    match parts.len() {
        0 => (String::new(), String::new()),
        1 => (parts[0].to_string(), String::new()),
        2 => (parts[0].to_string(), parts[1].to_string()),
        _ => (
            parts[0].to_string(),
            parts[parts.len() - 1].to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use tradewatch_protocol::RawRecord;

    fn cleaned(name: &str, asset: &str, amount: Option<&str>) -> CleanedDisclosure {
        CleanedDisclosure {
            source: "quiverquant".to_string(),
            politician_name: name.to_string(),
            transaction_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            disclosure_date: NaiveDate::from_ymd_opt(2024, 1, 20).unwrap(),
            asset_name: asset.to_string(),
            transaction_type: "purchase".to_string(),
            raw_data: RawRecord::new(),
            asset_ticker: None,
            asset_type: None,
            amount_text: amount.map(str::to_string),
            source_url: None,
            source_document_id: None,
        }
    }

    fn ctx() -> PipelineContext {
        PipelineContext::new("QuiverQuant", "quiverquant")
    }

    #[test]
    fn test_parse_politician_name_rules() {
        assert_eq!(parse_politician_name(""), (String::new(), String::new()));
        assert_eq!(parse_politician_name("Cher"), ("Cher".to_string(), String::new()));
        assert_eq!(
            parse_politician_name("Nancy Pelosi"),
            ("Nancy".to_string(), "Pelosi".to_string())
        );
        // Middle names drop.
        assert_eq!(
            parse_politician_name("James Earl Carter"),
            ("James".to_string(), "Carter".to_string())
        );
    }

    #[test]
    fn test_titles_are_stripped() {
        assert_eq!(
            parse_politician_name("Hon. Nancy Pelosi"),
            ("Nancy".to_string(), "Pelosi".to_string())
        );
        assert_eq!(
            parse_politician_name("Sen. Jon Tester"),
            ("Jon".to_string(), "Tester".to_string())
        );
        assert_eq!(
            parse_politician_name("The Right Honourable Rishi Sunak"),
            ("Rishi".to_string(), "Sunak".to_string())
        );
        assert_eq!(
            parse_politician_name("Rep. Dr. Jane Doe"),
            ("Jane".to_string(), "Doe".to_string())
        );
    }

    #[tokio::test]
    async fn test_normalize_extracts_ticker_and_amount() {
        let stage = NormalizationStage::new(None);
        let record = cleaned("Nancy Pelosi", "Apple Inc (AAPL)", Some("$1,001 - $15,000"));

        let result = stage.process(vec![record], &ctx()).await;
        assert_eq!(result.status, PipelineStatus::Success);
        let n = &result.data[0];
        assert_eq!(n.asset_ticker.as_deref(), Some("AAPL"));
        assert_eq!(n.asset_type.as_deref(), Some("stock"));
        assert_eq!(n.amount_range_min, Some(1001.0));
        assert_eq!(n.amount_range_max, Some(15000.0));
        assert_eq!(n.amount_exact, None);
    }

    #[tokio::test]
    async fn test_provided_ticker_is_canonicalized() {
        let stage = NormalizationStage::new(None);
        let mut record = cleaned("Nancy Pelosi", "Facebook Inc", None);
        record.asset_ticker = Some("FB".to_string());

        let result = stage.process(vec![record], &ctx()).await;
        assert_eq!(result.data[0].asset_ticker.as_deref(), Some("META"));
    }

    #[tokio::test]
    async fn test_chamber_field_drives_role_for_new_politicians() {
        let stage = NormalizationStage::new(None);
        let mut record = cleaned("Nancy Pelosi", "Apple Inc (AAPL)", None);
        record.raw_data.insert("chamber".into(), json!("House"));

        let result = stage.process(vec![record], &ctx()).await;
        assert_eq!(result.data[0].politician_role, "Representative");
    }

    #[tokio::test]
    async fn test_state_from_state_district() {
        let stage = NormalizationStage::new(None);
        let mut record = cleaned("Nancy Pelosi", "Apple Inc (AAPL)", None);
        record.raw_data.insert("state_district".into(), json!("CA-11"));

        let result = stage.process(vec![record], &ctx()).await;
        assert_eq!(result.data[0].politician_state.as_deref(), Some("CA"));
    }

    #[tokio::test]
    async fn test_asset_type_inference_fallback() {
        let stage = NormalizationStage::new(None);
        let result = stage
            .process(
                vec![
                    cleaned("A B", "Vanguard Total Stock Market Index Fund", None),
                    cleaned("A B", "US Treasury Bill", None),
                    cleaned("A B", "Bitcoin", None),
                ],
                &ctx(),
            )
            .await;

        let types: Vec<_> = result
            .data
            .iter()
            .map(|n| n.asset_type.as_deref().unwrap().to_string())
            .collect();
        assert_eq!(types, vec!["mutual_fund", "bond", "cryptocurrency"]);
    }

    #[tokio::test]
    async fn test_matched_politician_carries_identity() {
        let db = TradewatchDb::in_memory().await.unwrap();
        let politician =
            tradewatch_db::Politician::new("Nancy", "Pelosi", "Representative")
                .with_party(Some("D".to_string()))
                .with_state(Some("CA".to_string()));
        let id = db.insert_politician(&politician).await.unwrap();

        let stage = NormalizationStage::new(Some(db));
        let result = stage
            .process(vec![cleaned("Hon. Nancy Pelosi", "Apple Inc (AAPL)", None)], &ctx())
            .await;

        let n = &result.data[0];
        assert_eq!(n.politician_id.as_deref(), Some(id.as_str()));
        assert_eq!(n.politician_role, "Representative");
        assert_eq!(n.politician_party.as_deref(), Some("D"));
        assert_eq!(n.politician_state.as_deref(), Some("CA"));
    }
}
