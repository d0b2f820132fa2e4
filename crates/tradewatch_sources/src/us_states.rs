//! US state registry adapters.
//!
//! California, New York, and Texas publish legislator financial
//! disclosures through state ethics portals. The portals are plain HTML
//! tables with per-state column layouts, so one scraper parameterized
//! per state covers all three.

use crate::error::Result;
use crate::http::HttpFetcher;
use crate::source::{record_from_pairs, DisclosureSource};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{info, warn};

use tradewatch_protocol::{RawRecord, SourceConfig};
use tradewatch_storage::StorageManager;

/// Column layout of a state registry table.
#[derive(Debug, Clone, Copy)]
pub struct StateTableLayout {
    pub name_col: usize,
    pub date_col: usize,
    pub asset_col: usize,
    pub type_col: usize,
    pub amount_col: Option<usize>,
    pub min_cols: usize,
}

pub struct StateRegistrySource {
    config: SourceConfig,
    storage: Option<StorageManager>,
    listing_path: String,
    layout: StateTableLayout,
    state_code: &'static str,
}

impl StateRegistrySource {
    pub fn california() -> Self {
        Self {
            config: SourceConfig::new(
                "California FPPC",
                "california",
                "https://www.fppc.ca.gov",
            )
            .with_request_delay(2.0)
            .with_max_retries(3)
            .with_timeout(30)
            .with_header("User-Agent", "Mozilla/5.0 (compatible; TradewatchBot/1.0)"),
            storage: None,
            listing_path: "/transparency/form-700-filed-by-public-officials.html".to_string(),
            layout: StateTableLayout {
                name_col: 0,
                date_col: 1,
                asset_col: 2,
                type_col: 3,
                amount_col: Some(4),
                min_cols: 4,
            },
            state_code: "CA",
        }
    }

    pub fn new_york() -> Self {
        Self {
            config: SourceConfig::new(
                "New York COELIG",
                "new_york",
                "https://ethics.ny.gov",
            )
            .with_request_delay(2.0)
            .with_max_retries(3)
            .with_timeout(30)
            .with_header("User-Agent", "Mozilla/5.0 (compatible; TradewatchBot/1.0)"),
            storage: None,
            listing_path: "/financial-disclosure-statements".to_string(),
            layout: StateTableLayout {
                name_col: 0,
                date_col: 2,
                asset_col: 1,
                type_col: 3,
                amount_col: None,
                min_cols: 4,
            },
            state_code: "NY",
        }
    }

    pub fn texas() -> Self {
        Self {
            config: SourceConfig::new(
                "Texas Ethics Commission",
                "texas",
                "https://www.ethics.state.tx.us",
            )
            .with_request_delay(2.0)
            .with_max_retries(3)
            .with_timeout(30)
            .with_header("User-Agent", "Mozilla/5.0 (compatible; TradewatchBot/1.0)"),
            storage: None,
            listing_path: "/search/cf/".to_string(),
            layout: StateTableLayout {
                name_col: 0,
                date_col: 1,
                asset_col: 2,
                type_col: 3,
                amount_col: Some(4),
                min_cols: 4,
            },
            state_code: "TX",
        }
    }

    fn listing_url(&self) -> String {
        format!("{}{}", self.config.base_url, self.listing_path)
    }

    fn parse_listing(&self, html: &str, url: &str) -> Vec<RawRecord> {
        let document = Html::parse_document(html);
        let Ok(row_selector) = Selector::parse("table tr") else {
            return Vec::new();
        };
        let Ok(cell_selector) = Selector::parse("td") else {
            return Vec::new();
        };

        let layout = &self.layout;
        let mut records = Vec::new();

        for row in document.select(&row_selector) {
            let cells: Vec<String> = row
                .select(&cell_selector)
                .map(|cell| cell.text().collect::<String>().trim().to_string())
                .collect();

            if cells.len() < layout.min_cols {
                continue;
            }

            let name = cells.get(layout.name_col).cloned().unwrap_or_default();
            let date = cells.get(layout.date_col).cloned().unwrap_or_default();
            let asset = cells.get(layout.asset_col).cloned().unwrap_or_default();
            let kind = cells.get(layout.type_col).cloned().unwrap_or_default();
            let amount = layout
                .amount_col
                .and_then(|i| cells.get(i).cloned())
                .unwrap_or_default();

            if name.is_empty() || asset.is_empty() {
                continue;
            }

            records.push(record_from_pairs(vec![
                ("politician_name", json!(name)),
                ("transaction_date", json!(date)),
                ("disclosure_date", json!(date)),
                ("asset_name", json!(asset)),
                ("transaction_type", json!(kind.to_lowercase())),
                ("amount", json!(amount)),
                ("state", json!(self.state_code)),
                ("source_url", json!(url)),
            ]));
        }

        records
    }
}

#[async_trait]
impl DisclosureSource for StateRegistrySource {
    fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn configure(&mut self, overrides: &BTreeMap<String, serde_json::Value>) {
        self.config.apply(overrides);
        if let Some(path) = overrides.get("listing_path").and_then(|v| v.as_str()) {
            self.listing_path = path.to_string();
        }
    }

    fn attach_storage(&mut self, storage: StorageManager) {
        self.storage = Some(storage);
    }

    async fn fetch(
        &self,
        _lookback_days: u32,
        _params: &BTreeMap<String, serde_json::Value>,
    ) -> Result<Vec<RawRecord>> {
        let fetcher = HttpFetcher::new(&self.config)?;
        let url = self.listing_url();

        info!(%url, state = self.state_code, "Fetching state registry listing");
        let html = fetcher.get_text(&url).await?;

        if let Some(storage) = &self.storage {
            let payload = json!({ "url": url, "html": html });
            if let Err(e) = storage
                .save_api_response(&payload, &self.config.source_type, &self.listing_path, Some(&url))
                .await
            {
                warn!(error = %e, "Failed to archive state listing");
            }
        }

        let records = self.parse_listing(&html, &url);
        info!(count = records.len(), state = self.state_code, "Parsed state registry records");
        Ok(records)
    }
}
