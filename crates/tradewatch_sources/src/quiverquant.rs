//! QuiverQuant adapter.
//!
//! Two modes: the authenticated JSON API (preferred, needs an API key)
//! and a fallback scrape of the public congress-trading table. In API
//! mode the whole response is archived before parsing.

use crate::error::{Result, SourceError};
use crate::http::HttpFetcher;
use crate::source::{record_from_pairs, DisclosureSource};
use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{info, warn};

use tradewatch_protocol::{RawRecord, SourceConfig, TransactionType};
use tradewatch_storage::StorageManager;

const API_URL: &str = "https://api.quiverquant.com/beta/live/congresstrading";

pub struct QuiverQuantSource {
    config: SourceConfig,
    storage: Option<StorageManager>,
    api_url: String,
}

impl QuiverQuantSource {
    pub fn new() -> Self {
        Self {
            config: default_config(),
            storage: None,
            api_url: API_URL.to_string(),
        }
    }

    fn congress_page_url(&self) -> String {
        format!("{}/congresstrading/", self.config.base_url)
    }

    async fn fetch_via_api(
        &self,
        fetcher: &HttpFetcher,
        api_key: &str,
        lookback_days: u32,
    ) -> Result<Vec<RawRecord>> {
        info!("Fetching QuiverQuant data via API");

        let api_url = self.api_url.clone();
        let auth = format!("Bearer {api_key}");
        let response = fetcher
            .send(move |client| client.get(&api_url).header("Authorization", auth.clone()))
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Transient(format!("HTTP {status} from QuiverQuant API")));
        }
        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("invalid JSON from QuiverQuant API: {e}")))?;

        // Archive the entire response before any parsing.
        if let Some(storage) = &self.storage {
            // Bare arrays are wrapped so archived payloads share a shape.
            let to_store = if payload.is_array() {
                json!({ "trades": payload, "lookback_days": lookback_days })
            } else {
                payload.clone()
            };
            match storage
                .save_api_response(&to_store, "quiverquant", "/congresstrading", Some(&self.api_url))
                .await
            {
                Ok((path, file_id)) => info!(%path, %file_id, "Archived API response"),
                Err(e) => warn!(error = %e, "Failed to archive API response"),
            }
        }

        Ok(parse_api_payload(&payload))
    }

    async fn fetch_via_web(&self, fetcher: &HttpFetcher) -> Result<Vec<RawRecord>> {
        let url = self.congress_page_url();
        info!(%url, "Fetching QuiverQuant data via web scraping");
        let html = fetcher.get_text(&url).await?;
        Ok(parse_web_table(&html, &url))
    }
}

impl Default for QuiverQuantSource {
    fn default() -> Self {
        Self::new()
    }
}

fn default_config() -> SourceConfig {
    SourceConfig::new("QuiverQuant", "quiverquant", "https://www.quiverquant.com")
        .with_request_delay(3.0)
        .with_max_retries(2)
        .with_timeout(30)
        .with_header(
            "User-Agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
        )
}

/// Map API rows to the internal record schema.
///
/// `Representative→politician_name`, `Ticker→asset_ticker`,
/// `TransactionDate→transaction_date`, `ReportDate→disclosure_date`,
/// `Transaction→transaction_type`, `Range|Amount→amount`,
/// `House→chamber`, `BioGuideID→bioguide_id`.
pub fn parse_api_payload(payload: &serde_json::Value) -> Vec<RawRecord> {
    let trades = match payload {
        serde_json::Value::Array(items) => items.as_slice(),
        serde_json::Value::Object(map) => map
            .get("trades")
            .or_else(|| map.get("data"))
            .or_else(|| map.get("results"))
            .and_then(|v| v.as_array())
            .map(|v| v.as_slice())
            .unwrap_or(&[]),
        _ => &[],
    };

    let mut records = Vec::new();
    for trade in trades {
        let get = |key: &str| -> String {
            trade
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .trim()
                .to_string()
        };

        let politician_name = get("Representative");
        if politician_name.is_empty() {
            continue;
        }

        let asset_name = {
            let description = get("Description");
            if description.is_empty() {
                let alt = get("AssetDescription");
                if alt.is_empty() {
                    get("Ticker")
                } else {
                    alt
                }
            } else {
                description
            }
        };

        let amount = {
            let range = get("Range");
            if range.is_empty() {
                get("Amount")
            } else {
                range
            }
        };

        records.push(record_from_pairs(vec![
            ("politician_name", json!(politician_name)),
            ("transaction_date", json!(get("TransactionDate"))),
            ("disclosure_date", json!(get("ReportDate"))),
            ("asset_name", json!(asset_name)),
            ("asset_ticker", json!(get("Ticker"))),
            (
                "transaction_type",
                json!(TransactionType::normalize(&get("Transaction"))),
            ),
            ("amount", json!(amount)),
            ("source_url", json!("https://www.quiverquant.com/congresstrading/")),
            ("document_id", json!(get("FilingID"))),
            ("chamber", json!(get("House"))),
            ("party", json!(get("Party"))),
            ("bioguide_id", json!(get("BioGuideID"))),
            ("extraction_method", json!("quiverquant_api")),
        ]));
    }

    info!(count = records.len(), "Parsed trades from QuiverQuant API");
    records
}

/// Heuristic scrape of the public HTML table (fallback mode).
pub fn parse_web_table(html: &str, source_url: &str) -> Vec<RawRecord> {
    let document = Html::parse_document(html);
    let Ok(row_selector) = Selector::parse("table tr, tbody tr") else {
        return Vec::new();
    };
    let Ok(cell_selector) = Selector::parse("td") else {
        return Vec::new();
    };

    let mut records = Vec::new();
    for row in document.select(&row_selector) {
        let cells: Vec<String> = row
            .select(&cell_selector)
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .collect();

        if cells.len() < 4 {
            continue;
        }
        if let Some(record) = parse_web_row(&cells, source_url) {
            records.push(record);
        }
    }

    info!(count = records.len(), "Parsed trades from QuiverQuant web table");
    records
}

/// Columns on the public table shift over time, so cells are classified
/// by shape rather than position.
fn parse_web_row(cells: &[String], source_url: &str) -> Option<RawRecord> {
    let mut politician_name = String::new();
    let mut transaction_date = String::new();
    let mut ticker = String::new();
    let mut asset_name = String::new();
    let mut transaction_type = String::new();
    let mut amount = String::new();

    for text in cells {
        if text.is_empty() {
            continue;
        }

        if politician_name.is_empty() && text.len() > 3 && text.contains(' ') && !looks_like_date(text)
        {
            politician_name = text.clone();
        } else if looks_like_date(text) {
            transaction_date = text.clone();
        } else if text.len() <= 5 && text.chars().all(|c| c.is_ascii_uppercase()) {
            ticker = text.clone();
        } else if ["Inc", "Corp", "Ltd", "LLC", "Corporation"]
            .iter()
            .any(|w| text.contains(w))
        {
            asset_name = text.clone();
        } else if ["purchase", "sale", "buy", "sell"]
            .iter()
            .any(|w| text.to_lowercase().contains(w))
        {
            if let Some((kind, rest)) = text.split_once('$') {
                transaction_type = kind.trim().to_string();
                amount = format!("${rest}");
            } else {
                transaction_type = text.clone();
            }
        } else if text.contains('$') || (text.contains(',') && text.chars().any(|c| c.is_ascii_digit()))
        {
            amount = text.clone();
        } else if asset_name.is_empty() && text.len() > 6 && text.to_uppercase() != *text {
            asset_name = text.clone();
        }
    }

    if politician_name.is_empty() || (transaction_date.is_empty() && ticker.is_empty()) {
        return None;
    }

    let fallback_asset = if asset_name.is_empty() {
        if ticker.is_empty() {
            "Unknown".to_string()
        } else {
            ticker.clone()
        }
    } else {
        asset_name
    };

    Some(record_from_pairs(vec![
        ("politician_name", json!(politician_name)),
        ("transaction_date", json!(transaction_date)),
        ("disclosure_date", json!(transaction_date)),
        ("asset_name", json!(fallback_asset)),
        ("asset_ticker", json!(ticker)),
        (
            "transaction_type",
            json!(TransactionType::normalize(&transaction_type)),
        ),
        ("amount", json!(amount)),
        ("source_url", json!(source_url)),
        ("extraction_method", json!("quiverquant_web")),
    ]))
}

fn looks_like_date(text: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"\d{4}-\d{1,2}-\d{1,2}|\d{1,2}/\d{1,2}/\d{4}|\d{1,2}-\d{1,2}-\d{4}|\w{3}\s+\d{1,2},?\s+\d{4}")
            .unwrap()
    });
    text.len() >= 8 && re.is_match(text)
}

#[async_trait]
impl DisclosureSource for QuiverQuantSource {
    fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn configure(&mut self, overrides: &BTreeMap<String, serde_json::Value>) {
        self.config.apply(overrides);
        if let Some(url) = overrides.get("api_url").and_then(|v| v.as_str()) {
            self.api_url = url.to_string();
        }
    }

    fn attach_storage(&mut self, storage: StorageManager) {
        self.storage = Some(storage);
    }

    async fn fetch(
        &self,
        lookback_days: u32,
        params: &BTreeMap<String, serde_json::Value>,
    ) -> Result<Vec<RawRecord>> {
        let api_key = params
            .get("api_key")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| self.config.params.get("api_key").cloned());

        let fetcher = HttpFetcher::new(&self.config)?;

        match api_key {
            Some(key) if !key.is_empty() => self.fetch_via_api(&fetcher, &key, lookback_days).await,
            _ => self.fetch_via_web(&fetcher).await,
        }
    }
}
