//! US House of Representatives adapter.
//!
//! The House Clerk publishes an annual ZIP (`{year}FD.ZIP`) whose single
//! tab-separated member lists every filing for the year. That index is
//! the unit of ingestion; PDF parsing is an optional follow-on that
//! recovers per-transaction detail through the text-extractor seam.

use crate::error::{Result, SourceError};
use crate::http::HttpFetcher;
use crate::pdf_text::{extract_transactions_from_text, NullPdfTextExtractor, PdfTextExtractor};
use crate::source::{record_from_pairs, DisclosureSource};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::Arc;
use tracing::{debug, info, warn};

use tradewatch_protocol::{parse_disclosure_date, RawRecord, SourceConfig};
use tradewatch_storage::StorageManager;

/// Index columns: Prefix, Last, First, Suffix, FilingType, StateDst,
/// Year, FilingDate, DocID.
const INDEX_MIN_FIELDS: usize = 9;

pub struct UsHouseSource {
    config: SourceConfig,
    storage: Option<StorageManager>,
    extractor: Arc<dyn PdfTextExtractor>,
}

impl UsHouseSource {
    pub fn new() -> Self {
        Self {
            config: default_config(),
            storage: None,
            extractor: Arc::new(NullPdfTextExtractor),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn PdfTextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    fn zip_url(&self, year: i32) -> String {
        format!(
            "{}/public_disc/financial-pdfs/{}FD.ZIP",
            self.config.base_url, year
        )
    }

    fn pdf_url(&self, year: i32, doc_id: &str) -> String {
        format!(
            "{}/public_disc/financial-pdfs/{}/{}.pdf",
            self.config.base_url, year, doc_id
        )
    }

    /// Unpack the index member from the annual ZIP and parse its rows.
    fn parse_index(&self, zip_bytes: &[u8], year: i32) -> Result<Vec<IndexEntry>> {
        let mut archive = zip::ZipArchive::new(Cursor::new(zip_bytes))?;
        let member_name = format!("{year}FD.txt");

        let content = {
            let mut member = archive.by_name(&member_name).map_err(|_| {
                SourceError::Parse(format!("expected member {member_name} missing from index ZIP"))
            })?;
            let mut bytes = Vec::new();
            member
                .read_to_end(&mut bytes)
                .map_err(|e| SourceError::Parse(format!("failed reading {member_name}: {e}")))?;
            String::from_utf8_lossy(&bytes).into_owned()
        };

        let mut entries = Vec::new();
        // First line is the header row.
        for line in content.lines().skip(1) {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < INDEX_MIN_FIELDS {
                continue;
            }

            let prefix = fields[0].trim();
            let last_name = fields[1].trim();
            let first_name = fields[2].trim();
            let suffix = fields[3].trim();
            let filing_type = fields[4].trim();
            let state_district = fields[5].trim();
            let filing_date_str = fields[7].trim();
            // Raw rows carry trailing carriage returns on the last field.
            let doc_id = fields[8].trim_end_matches('\r').trim();

            if doc_id.is_empty() || doc_id == "DocID" {
                continue;
            }

            let full_name = [prefix, first_name, last_name, suffix]
                .iter()
                .filter(|part| !part.is_empty())
                .cloned()
                .collect::<Vec<_>>()
                .join(" ");

            let filing_date = parse_disclosure_date(filing_date_str);

            entries.push(IndexEntry {
                full_name,
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                state_district: state_district.to_string(),
                filing_type: filing_type.to_string(),
                filing_date,
                doc_id: doc_id.to_string(),
                pdf_url: self.pdf_url(year, doc_id),
            });
        }

        Ok(entries)
    }

    /// Download one filing PDF, archive it, and recover transactions.
    async fn parse_filing_pdf(
        &self,
        fetcher: &HttpFetcher,
        entry: &IndexEntry,
    ) -> Result<Vec<RawRecord>> {
        let pdf_bytes = fetcher.get_bytes(&entry.pdf_url).await?;

        if let Some(storage) = &self.storage {
            let date = entry.filing_date.unwrap_or_else(|| Utc::now().date_naive());
            if let Err(e) = storage
                .save_pdf(
                    &pdf_bytes,
                    &entry.doc_id,
                    &entry.full_name,
                    &entry.pdf_url,
                    date,
                    "house_pdf",
                )
                .await
            {
                warn!(error = %e, doc_id = %entry.doc_id, "Failed to archive House PDF");
            }
        }

        let text = self.extractor.extract_text(&pdf_bytes);
        if text.is_empty() {
            debug!(doc_id = %entry.doc_id, "No text extracted, skipping transaction recovery");
            return Ok(Vec::new());
        }

        let transactions = extract_transactions_from_text(&text);
        info!(doc_id = %entry.doc_id, count = transactions.len(), "Recovered transactions from PDF");

        Ok(transactions
            .into_iter()
            .map(|txn| {
                let transaction_date = txn
                    .transaction_date
                    .or(entry.filing_date)
                    .map(|d| d.to_string());
                record_from_pairs(vec![
                    ("politician_name", json!(entry.full_name)),
                    ("first_name", json!(entry.first_name)),
                    ("last_name", json!(entry.last_name)),
                    ("state_district", json!(entry.state_district)),
                    ("transaction_date", json!(transaction_date)),
                    (
                        "disclosure_date",
                        json!(entry.filing_date.map(|d| d.to_string())),
                    ),
                    ("asset_name", json!(txn.asset_name)),
                    ("asset_ticker", json!(txn.ticker)),
                    ("transaction_type", json!(txn.transaction_type)),
                    ("amount_min", json!(txn.amount_min)),
                    ("amount_max", json!(txn.amount_max)),
                    ("amount_exact", json!(txn.amount_exact)),
                    ("source_url", json!(entry.pdf_url)),
                    ("document_id", json!(entry.doc_id)),
                    ("filing_type", json!(entry.filing_type)),
                ])
            })
            .collect())
    }

    fn metadata_record(&self, entry: &IndexEntry) -> RawRecord {
        let filing_date = entry.filing_date.map(|d| d.to_string());
        record_from_pairs(vec![
            ("politician_name", json!(entry.full_name)),
            ("first_name", json!(entry.first_name)),
            ("last_name", json!(entry.last_name)),
            ("state_district", json!(entry.state_district)),
            ("transaction_date", json!(filing_date)),
            ("disclosure_date", json!(filing_date)),
            ("asset_name", json!(format!("{} Filing", entry.filing_type))),
            // The index alone has no transaction detail; purchase is the
            // placeholder until the PDF is parsed.
            ("transaction_type", json!("purchase")),
            ("source_url", json!(entry.pdf_url)),
            ("document_id", json!(entry.doc_id)),
            ("filing_type", json!(entry.filing_type)),
        ])
    }
}

impl Default for UsHouseSource {
    fn default() -> Self {
        Self::new()
    }
}

fn default_config() -> SourceConfig {
    SourceConfig::new(
        "US House of Representatives",
        "us_house",
        "https://disclosures-clerk.house.gov",
    )
    .with_request_delay(2.0)
    .with_max_retries(3)
    .with_timeout(60)
    .with_header("User-Agent", "Mozilla/5.0 (compatible; TradewatchBot/1.0)")
}

#[derive(Debug, Clone)]
struct IndexEntry {
    full_name: String,
    first_name: String,
    last_name: String,
    state_district: String,
    filing_type: String,
    filing_date: Option<NaiveDate>,
    doc_id: String,
    pdf_url: String,
}

#[async_trait]
impl DisclosureSource for UsHouseSource {
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
        let year = params
            .get("year")
            .and_then(|v| v.as_i64())
            .map(|y| y as i32)
            .unwrap_or_else(|| Utc::now().year());
        let parse_pdfs = params
            .get("parse_pdfs")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let max_pdfs = params
            .get("max_pdfs_per_run")
            .and_then(|v| v.as_u64())
            .unwrap_or(25) as usize;

        let fetcher = HttpFetcher::new(&self.config)?;
        let zip_url = self.zip_url(year);

        info!(%zip_url, "Downloading House disclosure index");
        let zip_bytes = fetcher.get_bytes(&zip_url).await?;
        info!(size = zip_bytes.len(), "Downloaded index ZIP");

        let entries = self.parse_index(&zip_bytes, year)?;
        info!(count = entries.len(), year, "Parsed House index records");

        let mut records = Vec::new();
        let mut parsed_pdfs = 0usize;

        for entry in &entries {
            if parse_pdfs && parsed_pdfs < max_pdfs {
                match self.parse_filing_pdf(&fetcher, entry).await {
                    Ok(transactions) if !transactions.is_empty() => {
                        parsed_pdfs += 1;
                        records.extend(transactions);
                        continue;
                    }
                    Ok(_) => {
                        parsed_pdfs += 1;
                    }
                    Err(e) => {
                        warn!(error = %e, doc_id = %entry.doc_id, "PDF parse failed");
                    }
                }
            }
            records.push(self.metadata_record(entry));
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn build_index_zip(year: i32, rows: &[&str]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file(format!("{year}FD.txt"), options).unwrap();
            let header =
                "Prefix\tLast\tFirst\tSuffix\tFilingType\tStateDst\tYear\tFilingDate\tDocID";
            let mut content = header.to_string();
            for row in rows {
                content.push('\n');
                content.push_str(row);
            }
            writer.write_all(content.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_parse_index_happy_path() {
        let source = UsHouseSource::new();
        let zip = build_index_zip(
            2024,
            &["Hon.\tPelosi\tNancy\t\tP\tCA-11\t2024\t01/15/2024\t10020001\r"],
        );

        let entries = source.parse_index(&zip, 2024).unwrap();
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.full_name, "Hon. Nancy Pelosi");
        assert_eq!(e.doc_id, "10020001");
        assert_eq!(e.filing_date, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert!(e.pdf_url.ends_with("/2024/10020001.pdf"));
    }

    #[test]
    fn test_parse_index_skips_short_rows() {
        let source = UsHouseSource::new();
        let zip = build_index_zip(2024, &["short\trow", ""]);
        assert!(source.parse_index(&zip, 2024).unwrap().is_empty());
    }

    #[test]
    fn test_carriage_return_stripped_from_doc_id() {
        let source = UsHouseSource::new();
        let zip = build_index_zip(
            2024,
            &["\tTester\tJon\t\tP\tMT-00\t2024\t02/01/2024\t20001234\r"],
        );
        let entries = source.parse_index(&zip, 2024).unwrap();
        assert_eq!(entries[0].doc_id, "20001234");
        assert!(!entries[0].pdf_url.contains('\r'));
    }

    #[tokio::test]
    async fn test_fetch_yields_metadata_records() {
        let server = MockServer::start().await;
        let zip = build_index_zip(
            2024,
            &["Hon.\tPelosi\tNancy\t\tP\tCA-11\t2024\t01/15/2024\t10020001"],
        );
        Mock::given(method("GET"))
            .and(path("/public_disc/financial-pdfs/2024FD.ZIP"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(zip))
            .mount(&server)
            .await;

        let mut source = UsHouseSource::new();
        source.config.base_url = server.uri();
        source.config.request_delay = 0.0;

        let mut params = BTreeMap::new();
        params.insert("year".to_string(), json!(2024));
        let records = source.fetch(30, &params).await.unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record["politician_name"], json!("Hon. Nancy Pelosi"));
        assert_eq!(record["asset_name"], json!("P Filing"));
        assert_eq!(record["transaction_type"], json!("purchase"));
        assert!(record["source_url"]
            .as_str()
            .unwrap()
            .ends_with("/2024/10020001.pdf"));
    }
}
