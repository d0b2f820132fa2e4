//! Disclosure record types for the ingestion pipeline.
//!
//! A record moves through three representations: `RawDisclosure` (opaque
//! source mapping), `CleanedDisclosure` (validated, required fields
//! present), and `NormalizedDisclosure` (politician/asset/amount resolved,
//! ready for the publisher).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Opaque source record. Schema-on-read: the cleaning stage is the only
/// consumer that tolerates missing fields.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Fetch a trimmed, non-empty string field from a raw record.
pub fn raw_str(record: &RawRecord, key: &str) -> Option<String> {
    let value = record.get(key)?;
    let text = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

// ============================================================================
// Transaction / Asset enums
// ============================================================================

/// Canonical transaction types for a disclosure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Purchase,
    Sale,
    Exchange,
    OptionPurchase,
    OptionSale,
    OptionExercise,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Sale => "sale",
            Self::Exchange => "exchange",
            Self::OptionPurchase => "option_purchase",
            Self::OptionSale => "option_sale",
            Self::OptionExercise => "option_exercise",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "purchase" => Some(Self::Purchase),
            "sale" => Some(Self::Sale),
            "exchange" => Some(Self::Exchange),
            "option_purchase" => Some(Self::OptionPurchase),
            "option_sale" => Some(Self::OptionSale),
            "option_exercise" => Some(Self::OptionExercise),
            _ => None,
        }
    }

    /// Map common source variants to a canonical lowercase value.
    ///
    /// Unmapped values pass through lowercased so that non-strict cleaning
    /// can keep them; strict validation rejects anything `parse` refuses.
    pub fn normalize(raw: &str) -> String {
        let lowered = raw.trim().to_lowercase();
        match lowered.as_str() {
            "buy" | "bought" => "purchase".to_string(),
            "sell" | "sold" => "sale".to_string(),
            "swap" | "trade" => "exchange".to_string(),
            "option buy" => "option_purchase".to_string(),
            "option sell" => "option_sale".to_string(),
            _ => lowered,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inferred asset classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Stock,
    Etf,
    MutualFund,
    Bond,
    Option,
    Cryptocurrency,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Etf => "etf",
            Self::MutualFund => "mutual_fund",
            Self::Bond => "bond",
            Self::Option => "option",
            Self::Cryptocurrency => "cryptocurrency",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "stock" => Some(Self::Stock),
            "etf" => Some(Self::Etf),
            "mutual_fund" => Some(Self::MutualFund),
            "bond" => Some(Self::Bond),
            "option" => Some(Self::Option),
            "cryptocurrency" => Some(Self::Cryptocurrency),
            _ => None,
        }
    }

    /// Infer an asset class from the asset name. Keyword rules, first
    /// match wins; anything unmatched is a stock, ticker or not.
    pub fn infer(asset_name: &str, _has_ticker: bool) -> Self {
        let lower = asset_name.to_lowercase();

        if ["fund", "mutual", "etf", "index"].iter().any(|w| lower.contains(w)) {
            if lower.contains("etf") || lower.contains("exchange traded") {
                return Self::Etf;
            }
            return Self::MutualFund;
        }
        if ["bond", "treasury", "note", "bill"].iter().any(|w| lower.contains(w)) {
            return Self::Bond;
        }
        if ["option", "call", "put"].iter().any(|w| lower.contains(w)) {
            return Self::Option;
        }
        if ["crypto", "bitcoin", "ethereum"].iter().any(|w| lower.contains(w)) {
            return Self::Cryptocurrency;
        }

        Self::Stock
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Pipeline record types
// ============================================================================

/// Raw disclosure snapshot as produced by a source adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDisclosure {
    pub source: String,
    pub source_type: String,
    pub raw_data: RawRecord,
    pub scraped_at: DateTime<Utc>,
    pub source_url: Option<String>,
    pub source_document_id: Option<String>,
}

impl RawDisclosure {
    pub fn new(source: &str, source_type: &str, raw_data: RawRecord) -> Self {
        let source_url = raw_str(&raw_data, "source_url");
        let source_document_id = raw_str(&raw_data, "document_id");
        Self {
            source: source.to_string(),
            source_type: source_type.to_string(),
            raw_data,
            scraped_at: Utc::now(),
            source_url,
            source_document_id,
        }
    }
}

/// Validated disclosure: required fields present and non-empty, dates
/// parsed, transaction type normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanedDisclosure {
    pub source: String,
    pub politician_name: String,
    pub transaction_date: NaiveDate,
    pub disclosure_date: NaiveDate,
    pub asset_name: String,
    pub transaction_type: String,
    pub raw_data: RawRecord,

    pub asset_ticker: Option<String>,
    pub asset_type: Option<String>,
    pub amount_text: Option<String>,
    pub source_url: Option<String>,
    pub source_document_id: Option<String>,
}

/// Disclosure with resolved politician and asset metadata, ready for the
/// publisher. `politician_id` is None when the politician will be created
/// downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedDisclosure {
    pub politician_id: Option<String>,
    pub politician_first_name: String,
    pub politician_last_name: String,
    pub politician_full_name: String,
    pub politician_role: String,
    pub politician_party: Option<String>,
    pub politician_state: Option<String>,

    pub transaction_date: NaiveDate,
    pub disclosure_date: NaiveDate,
    pub transaction_type: String,

    pub asset_name: String,
    pub asset_ticker: Option<String>,
    pub asset_type: Option<String>,

    pub amount_range_min: Option<f64>,
    pub amount_range_max: Option<f64>,
    pub amount_exact: Option<f64>,

    pub source: String,
    pub source_url: Option<String>,
    pub source_document_id: Option<String>,
    pub raw_data: RawRecord,

    pub processed_at: DateTime<Utc>,
}

/// Per-record outcome emitted by the publishing stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishedRecord {
    Inserted {
        disclosure_id: String,
        politician_id: String,
    },
    Updated {
        disclosure_id: String,
        politician_id: String,
    },
    Skipped {
        politician_id: String,
    },
    /// Stage-level counters, emitted once as the first element.
    Summary(PublishStats),
}

/// Counters the publisher accumulates across one stage run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishStats {
    pub politicians_created: u64,
    pub politicians_matched: u64,
    pub disclosures_inserted: u64,
    pub disclosures_updated: u64,
    pub disclosures_skipped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_type_roundtrip() {
        for tt in [
            TransactionType::Purchase,
            TransactionType::Sale,
            TransactionType::Exchange,
            TransactionType::OptionPurchase,
            TransactionType::OptionSale,
            TransactionType::OptionExercise,
        ] {
            assert_eq!(TransactionType::parse(tt.as_str()), Some(tt));
        }
    }

    #[test]
    fn test_transaction_type_synonyms() {
        assert_eq!(TransactionType::normalize("Buy"), "purchase");
        assert_eq!(TransactionType::normalize("bought"), "purchase");
        assert_eq!(TransactionType::normalize("SOLD"), "sale");
        assert_eq!(TransactionType::normalize("swap"), "exchange");
        assert_eq!(TransactionType::normalize("trade"), "exchange");
        assert_eq!(TransactionType::normalize("option buy"), "option_purchase");
        assert_eq!(TransactionType::normalize("option sell"), "option_sale");
        // Unknown values pass through lowercased
        assert_eq!(TransactionType::normalize("Gift"), "gift");
    }

    #[test]
    fn test_asset_type_inference() {
        assert_eq!(AssetType::infer("Vanguard Index Fund", false), AssetType::MutualFund);
        assert_eq!(AssetType::infer("SPDR S&P 500 ETF Trust", true), AssetType::Etf);
        assert_eq!(AssetType::infer("US Treasury Note", false), AssetType::Bond);
        assert_eq!(AssetType::infer("AAPL Call Option", true), AssetType::Option);
        assert_eq!(AssetType::infer("Bitcoin", false), AssetType::Cryptocurrency);
        assert_eq!(AssetType::infer("Apple Inc", true), AssetType::Stock);
        assert_eq!(AssetType::infer("Something Unrecognizable", false), AssetType::Stock);
    }

    #[test]
    fn test_raw_str_trims_and_rejects_empty() {
        let mut record = RawRecord::new();
        record.insert("name".into(), serde_json::json!("  Nancy Pelosi  "));
        record.insert("empty".into(), serde_json::json!("   "));
        record.insert("num".into(), serde_json::json!(42));

        assert_eq!(raw_str(&record, "name").as_deref(), Some("Nancy Pelosi"));
        assert_eq!(raw_str(&record, "empty"), None);
        assert_eq!(raw_str(&record, "num").as_deref(), Some("42"));
        assert_eq!(raw_str(&record, "missing"), None);
    }
}
