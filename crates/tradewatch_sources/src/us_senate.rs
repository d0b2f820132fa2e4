//! US Senate EFD adapter.
//!
//! The EFD search system sits behind Django CSRF plus an Akamai WAF. A
//! three-step handshake must run before any search call:
//!
//! 1. `GET /search/` to receive a `csrftoken` cookie.
//! 2. `POST /search/home/` accepting the prohibition agreement; must
//!    yield a `sessionid` cookie, and the `csrftoken` rotates.
//! 3. `POST /search/report/data/` against the DataTables JSON API.
//!
//! HTTP 403, an empty body, a redirect back to `/home/`, or HTML where
//! JSON was expected all signal a WAF block; the orchestrator then falls
//! back to a browser driver replaying the same form flow.

use crate::error::{Result, SourceError};
use crate::http::HttpFetcher;
use crate::source::{record_from_pairs, DisclosureSource};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info};

use tradewatch_protocol::{RawRecord, SourceConfig};
use tradewatch_storage::StorageManager;

/// Report type 11 = Periodic Transaction Report.
const REPORT_TYPE_PTR: &str = "11";
/// Filer type 1 = Senator.
const FILER_TYPE_SENATOR: &str = "1";
/// DataTables page size.
const PAGE_LENGTH: u64 = 100;

pub struct UsSenateSource {
    config: SourceConfig,
    storage: Option<StorageManager>,
}

impl UsSenateSource {
    pub fn new() -> Self {
        Self {
            config: default_config(),
            storage: None,
        }
    }

    fn search_url(&self) -> String {
        format!("{}/search/", self.config.base_url)
    }

    fn home_url(&self) -> String {
        format!("{}/search/home/", self.config.base_url)
    }

    fn data_url(&self) -> String {
        format!("{}/search/report/data/", self.config.base_url)
    }

    /// Steps 1 and 2 of the handshake. Returns the post-agreement CSRF
    /// token.
    async fn establish_session(&self, fetcher: &HttpFetcher) -> Result<String> {
        info!("Step 1: fetching CSRF token from /search/");
        let search_url = self.search_url();
        let response = fetcher.send(|client| client.get(&search_url)).await?;
        check_waf_block(&response.url().to_string(), response.status(), None)?;
        // Body must be consumed for the cookie jar to settle.
        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Transient(e.to_string()))?;
        check_waf_block(&search_url, reqwest::StatusCode::OK, Some(body.as_str()))?;

        let csrf_token = fetcher
            .cookie(&self.config.base_url, "csrftoken")
            .ok_or_else(|| {
                SourceError::Session("no csrftoken cookie from GET /search/".to_string())
            })?;

        info!("Step 2: accepting agreement via POST /search/home/");
        let home_url = self.home_url();
        let base = self.config.base_url.clone();
        let token = csrf_token.clone();
        let response = fetcher
            .send(move |client| {
                client
                    .post(&home_url)
                    .header("Referer", format!("{base}/search/home/"))
                    .header("Origin", base.clone())
                    .form(&[
                        ("prohibition_agreement", "1"),
                        ("csrfmiddlewaretoken", token.as_str()),
                    ])
            })
            .await?;
        check_waf_block(&response.url().to_string(), response.status(), None)?;
        let _ = response.text().await;

        if fetcher.cookie(&self.config.base_url, "sessionid").is_none() {
            return Err(SourceError::Session(
                "no sessionid cookie after accepting agreement".to_string(),
            ));
        }

        // Django rotates the CSRF token after the agreement post.
        let refreshed = fetcher
            .cookie(&self.config.base_url, "csrftoken")
            .unwrap_or(csrf_token);

        info!("EFD session established");
        Ok(refreshed)
    }

    /// Step 3: page through the DataTables search endpoint.
    async fn search_ptrs(
        &self,
        fetcher: &HttpFetcher,
        csrf_token: &str,
        limit: Option<usize>,
    ) -> Result<Vec<RawRecord>> {
        let mut disclosures = Vec::new();
        let mut start: u64 = 0;

        loop {
            debug!(start, length = PAGE_LENGTH, "Searching PTRs");

            let data_url = self.data_url();
            let base = self.config.base_url.clone();
            let token = csrf_token.to_string();
            let start_str = start.to_string();
            let response = fetcher
                .send(move |client| {
                    client
                        .post(&data_url)
                        .header("Referer", format!("{base}/search/"))
                        .header("Origin", base.clone())
                        .header("X-Requested-With", "XMLHttpRequest")
                        .form(&[
                            ("start", start_str.as_str()),
                            ("length", "100"),
                            ("report_type_id", REPORT_TYPE_PTR),
                            ("filer_type_id", FILER_TYPE_SENATOR),
                            ("csrfmiddlewaretoken", token.as_str()),
                        ])
                })
                .await?;

            let final_url = response.url().to_string();
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| SourceError::Transient(e.to_string()))?;
            check_waf_block(&final_url, status, Some(body.as_str()))?;

            let payload: serde_json::Value = serde_json::from_str(&body).map_err(|_| {
                SourceError::Blocked(format!(
                    "non-JSON response from /search/report/data/ (status={status}, body={})",
                    body.chars().take(200).collect::<String>()
                ))
            })?;

            if payload.get("result").and_then(|v| v.as_str()) != Some("ok") {
                return Err(SourceError::Blocked(format!(
                    "unexpected result from /search/report/data/: {:?}",
                    payload.get("result")
                )));
            }

            let records_total = payload
                .get("recordsTotal")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            let rows = payload
                .get("data")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();

            if rows.is_empty() {
                break;
            }

            for row in &rows {
                if let Some(record) = self.parse_search_row(row) {
                    disclosures.push(record);
                }
            }

            if let Some(limit) = limit {
                if disclosures.len() >= limit {
                    disclosures.truncate(limit);
                    info!(limit, "Reached PTR search limit");
                    break;
                }
            }

            start += PAGE_LENGTH;
            if start >= records_total {
                break;
            }
        }

        info!(count = disclosures.len(), "Found PTR disclosures");
        Ok(disclosures)
    }

    /// A DataTables row: `[first, last, filer type, report link, date]`.
    /// The report cell is an HTML anchor to the PTR page.
    fn parse_search_row(&self, row: &serde_json::Value) -> Option<RawRecord> {
        let cells = row.as_array()?;
        if cells.len() < 5 {
            return None;
        }

        let first_name = cells[0].as_str().unwrap_or("").trim();
        let last_name = cells[1].as_str().unwrap_or("").trim();
        let link_html = cells[3].as_str().unwrap_or("");
        let filed_date = cells[4].as_str().unwrap_or("").trim();

        if first_name.is_empty() && last_name.is_empty() {
            return None;
        }

        let (href, label) = parse_report_link(link_html)?;
        let ptr_url = if href.starts_with("http") {
            href
        } else {
            format!("{}{}", self.config.base_url, href)
        };

        Some(record_from_pairs(vec![
            ("politician_name", json!(format!("{first_name} {last_name}"))),
            ("first_name", json!(first_name)),
            ("last_name", json!(last_name)),
            ("report_title", json!(label)),
            ("transaction_date", json!(filed_date)),
            ("disclosure_date", json!(filed_date)),
            // Placeholder until the PTR page is parsed for transactions.
            ("asset_name", json!(label)),
            ("transaction_type", json!("purchase")),
            ("source_url", json!(ptr_url)),
            ("chamber", json!("Senate")),
        ]))
    }

    /// Fetch one PTR page with the established session and parse its
    /// transaction table into full records.
    async fn fetch_ptr_page(
        &self,
        fetcher: &HttpFetcher,
        meta: &RawRecord,
        url: &str,
    ) -> Result<Vec<RawRecord>> {
        let response = fetcher.send(|client| client.get(url)).await?;
        let final_url = response.url().to_string();
        let status = response.status();

        // A session drop bounces PTR pages back to the agreement screen.
        if final_url.contains("/home/") && !url.contains("/home/") {
            return Err(SourceError::Blocked(format!(
                "redirected to agreement page when fetching {url}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Transient(e.to_string()))?;
        check_waf_block(&final_url, status, Some(body.as_str()))?;

        if let Some(storage) = &self.storage {
            let payload = json!({ "url": url, "html": body });
            if let Err(e) = storage
                .save_api_response(&payload, "us_senate", "/search/view/ptr", Some(url))
                .await
            {
                tracing::warn!(error = %e, "Failed to archive PTR page");
            }
        }

        Ok(parse_ptr_page_html(&body, meta, url))
    }
}

impl Default for UsSenateSource {
    fn default() -> Self {
        Self::new()
    }
}

fn default_config() -> SourceConfig {
    SourceConfig::new("US Senate EFD", "us_senate", "https://efdsearch.senate.gov")
        .with_request_delay(1.0)
        .with_max_retries(3)
        .with_timeout(30)
        .with_header(
            "User-Agent",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        )
}

/// WAF block heuristics shared by every EFD request.
fn check_waf_block(url: &str, status: reqwest::StatusCode, body: Option<&str>) -> Result<()> {
    if status == reqwest::StatusCode::FORBIDDEN {
        return Err(SourceError::Blocked(format!("HTTP 403 from {url}")));
    }
    if let Some(body) = body {
        if status.is_success() && body.trim().is_empty() {
            return Err(SourceError::Blocked(format!("empty response body from {url}")));
        }
    }
    Ok(())
}

/// Extract `(href, label)` from the report-cell anchor HTML.
fn parse_report_link(html: &str) -> Option<(String, String)> {
    let fragment = Html::parse_fragment(html);
    let selector = Selector::parse("a[href]").ok()?;
    let anchor = fragment.select(&selector).next()?;
    let href = anchor.value().attr("href")?.to_string();
    let label = anchor.text().collect::<String>().trim().to_string();
    Some((href, label))
}

/// Parse a PTR page's transaction table.
///
/// Row shape: # | transaction date | owner | ticker | asset name | asset
/// type | type | amount | comment. Column count varies across years, so
/// cells are matched from a minimum of eight.
fn parse_ptr_page_html(html: &str, meta: &RawRecord, url: &str) -> Vec<RawRecord> {
    let document = Html::parse_document(html);
    let Ok(row_selector) = Selector::parse("table tbody tr") else {
        return Vec::new();
    };
    let Ok(cell_selector) = Selector::parse("td") else {
        return Vec::new();
    };

    let politician_name = meta
        .get("politician_name")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let disclosure_date = meta
        .get("disclosure_date")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let mut records = Vec::new();
    for row in document.select(&row_selector) {
        let cells: Vec<String> = row
            .select(&cell_selector)
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .collect();

        if cells.len() < 8 {
            continue;
        }

        let transaction_date = &cells[1];
        let ticker = &cells[3];
        let asset_name = &cells[4];
        let asset_type = &cells[5];
        let transaction_type = &cells[6];
        let amount = &cells[7];

        if asset_name.is_empty() {
            continue;
        }

        records.push(record_from_pairs(vec![
            ("politician_name", json!(politician_name)),
            ("transaction_date", json!(transaction_date)),
            ("disclosure_date", json!(disclosure_date)),
            ("asset_name", json!(asset_name)),
            ("asset_ticker", json!(if ticker == "--" { "" } else { ticker })),
            ("asset_type", json!(asset_type)),
            ("transaction_type", json!(transaction_type)),
            ("amount", json!(amount)),
            ("source_url", json!(url)),
            ("chamber", json!("Senate")),
        ]));
    }

    records
}

#[async_trait]
impl DisclosureSource for UsSenateSource {
    fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn configure(&mut self, overrides: &BTreeMap<String, serde_json::Value>) {
        self.config.apply(overrides);
    }

    fn attach_storage(&mut self, storage: StorageManager) {
        self.storage = Some(storage);
    }

    async fn fetch(
        &self,
        _lookback_days: u32,
        params: &BTreeMap<String, serde_json::Value>,
    ) -> Result<Vec<RawRecord>> {
        let limit = params
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize);
        let parse_ptr_pages = params
            .get("parse_ptr_pages")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let fetcher = HttpFetcher::new(&self.config)?;
        let csrf_token = self.establish_session(&fetcher).await?;
        let search_rows = self.search_ptrs(&fetcher, &csrf_token, limit).await?;

        if !parse_ptr_pages {
            return Ok(search_rows);
        }

        let mut records = Vec::new();
        for meta in &search_rows {
            let Some(url) = meta.get("source_url").and_then(|v| v.as_str()) else {
                continue;
            };
            match self.fetch_ptr_page(&fetcher, meta, url).await {
                Ok(transactions) if !transactions.is_empty() => records.extend(transactions),
                Ok(_) => records.push(meta.clone()),
                Err(e) if e.is_blocked() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, %url, "PTR page fetch failed");
                    records.push(meta.clone());
                }
            }
        }

        Ok(records)
    }
}
