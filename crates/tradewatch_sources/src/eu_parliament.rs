//! EU Parliament adapter.
//!
//! MEP rosters come from the official XML endpoints; each MEP's
//! declarations page links Declaration of Private Interests (DPI) PDFs.
//! Downloads are verified by the `%PDF-` magic bytes before archival.

use crate::error::{Result, SourceError};
use crate::http::HttpFetcher;
use crate::source::{record_from_pairs, DisclosureSource};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

use tradewatch_protocol::{RawRecord, SourceConfig};
use tradewatch_storage::StorageManager;

/// How many MEP profiles one run visits by default.
const DEFAULT_MAX_MEPS: usize = 50;

pub struct EuParliamentSource {
    config: SourceConfig,
    storage: Option<StorageManager>,
}

/// One MEP from the roster XML.
#[derive(Debug, Clone, PartialEq)]
pub struct MepEntry {
    pub mep_id: String,
    pub full_name: String,
    pub country: String,
    pub political_group: String,
    pub national_party: String,
}

/// One DPI link discovered on a declarations page.
#[derive(Debug, Clone, PartialEq)]
pub struct DpiDeclaration {
    pub pdf_url: String,
    pub label: String,
    pub date: Option<NaiveDate>,
    /// 0 = original declaration, N for the Nth modification.
    pub revision: u32,
}

impl EuParliamentSource {
    pub fn new() -> Self {
        Self {
            config: default_config(),
            storage: None,
        }
    }

    fn mep_list_url(&self) -> String {
        format!("{}/meps/en/full-list/xml", self.config.base_url)
    }

    fn outgoing_meps_url(&self) -> String {
        format!("{}/meps/en/incoming-outgoing/outgoing/xml", self.config.base_url)
    }

    fn declarations_url(&self, mep: &MepEntry) -> String {
        format!(
            "{}/meps/en/{}/{}/declarations",
            self.config.base_url,
            mep.mep_id,
            name_to_slug(&mep.full_name)
        )
    }

    async fn fetch_roster(&self, fetcher: &HttpFetcher) -> Result<Vec<MepEntry>> {
        let mut meps = parse_mep_xml(&fetcher.get_text(&self.mep_list_url()).await?);
        info!(count = meps.len(), "Parsed current MEP roster");

        // Outgoing members from the previous term enable backfill; a
        // missing feed is not fatal.
        match fetcher.get_text(&self.outgoing_meps_url()).await {
            Ok(xml) => {
                let outgoing = parse_mep_xml(&xml);
                debug!(count = outgoing.len(), "Parsed outgoing MEP roster");
                meps.extend(outgoing);
            }
            Err(e) => warn!(error = %e, "Failed to fetch outgoing MEP roster"),
        }

        Ok(meps)
    }

    async fn fetch_declarations(
        &self,
        fetcher: &HttpFetcher,
        mep: &MepEntry,
    ) -> Result<Vec<DpiDeclaration>> {
        let url = self.declarations_url(mep);
        match fetcher.get_text(&url).await {
            Ok(html) => Ok(parse_declarations_html(&html, &self.config.base_url)),
            Err(SourceError::NotFound(_)) => {
                debug!(mep = %mep.full_name, "No declarations page");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Download a DPI PDF, verify the magic bytes, archive it.
    async fn download_dpi(
        &self,
        fetcher: &HttpFetcher,
        mep: &MepEntry,
        declaration: &DpiDeclaration,
    ) -> Result<Option<Vec<u8>>> {
        let bytes = match fetcher.get_bytes(&declaration.pdf_url).await {
            Ok(bytes) => bytes,
            Err(SourceError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        if !bytes.starts_with(b"%PDF-") {
            warn!(url = %declaration.pdf_url, "Downloaded content is not a valid PDF");
            return Ok(None);
        }

        if let Some(storage) = &self.storage {
            let date = declaration.date.unwrap_or_else(|| Utc::now().date_naive());
            let doc_id = format!("dpi-{}-{}", mep.mep_id, declaration.revision);
            if let Err(e) = storage
                .save_pdf(&bytes, &doc_id, &mep.full_name, &declaration.pdf_url, date, "eu_dpi_pdf")
                .await
            {
                warn!(error = %e, "Failed to archive DPI PDF");
            }
        }

        Ok(Some(bytes))
    }
}

impl Default for EuParliamentSource {
    fn default() -> Self {
        Self::new()
    }
}

fn default_config() -> SourceConfig {
    SourceConfig::new("EU Parliament", "eu_parliament", "https://www.europarl.europa.eu")
        .with_request_delay(1.5)
        .with_max_retries(3)
        .with_timeout(30)
        .with_header("User-Agent", "Mozilla/5.0 (compatible; TradewatchBot/1.0)")
}

/// Parse the MEP roster XML.
///
/// The markup is regular (`<mep>` with `<id>`, `<fullName>`, `<country>`,
/// `<politicalGroup>`, `<nationalPoliticalGroup>`), so the lenient HTML
/// parser handles it; element names come back lowercased.
pub fn parse_mep_xml(xml: &str) -> Vec<MepEntry> {
    let document = Html::parse_document(xml);
    let Ok(mep_selector) = Selector::parse("mep") else {
        return Vec::new();
    };

    let mut meps = Vec::new();
    for mep in document.select(&mep_selector) {
        let field = |name: &str| -> String {
            Selector::parse(name)
                .ok()
                .and_then(|sel| mep.select(&sel).next())
                .map(|el| el.text().collect::<String>().trim().to_string())
                .unwrap_or_default()
        };

        let mep_id = field("id");
        let full_name = field("fullname");
        if mep_id.is_empty() || full_name.is_empty() {
            continue;
        }

        meps.push(MepEntry {
            mep_id,
            full_name,
            country: field("country"),
            political_group: field("politicalgroup"),
            national_party: field("nationalpoliticalgroup"),
        });
    }

    meps
}

/// Scan a declarations page for DPI PDF links (`.pdf` hrefs whose path
/// contains `/DPI/`).
pub fn parse_declarations_html(html: &str, base_url: &str) -> Vec<DpiDeclaration> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut declarations = Vec::new();
    for anchor in document.select(&selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };

        if !href.to_lowercase().ends_with(".pdf") || !href.contains("/DPI/") {
            continue;
        }

        let pdf_url = if href.starts_with('/') {
            format!("{base_url}{href}")
        } else if href.starts_with("http") {
            href.to_string()
        } else {
            continue;
        };

        let label = {
            let text = anchor.text().collect::<String>().trim().to_string();
            if text.is_empty() {
                "Declaration".to_string()
            } else {
                text
            }
        };

        declarations.push(DpiDeclaration {
            date: extract_date_from_path(href),
            revision: parse_revision(&label),
            pdf_url,
            label,
        });
    }

    declarations
}

/// Collapse whitespace into `+` and fold accents to ASCII:
/// `María Teresa GIMÉNEZ BARBAT` → `Maria+Teresa+GIMENEZ+BARBAT`.
pub fn name_to_slug(name: &str) -> String {
    let folded: String = name
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join("+")
}

/// DPI paths embed upload dates as `YYYYMMDD`.
fn extract_date_from_path(path: &str) -> Option<NaiveDate> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(\d{4})(\d{2})(\d{2})").unwrap());

    let caps = re.captures(path)?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    if !(2004..=2030).contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Revision index: 0 for the original, N for "Nth modification".
fn parse_revision(label: &str) -> u32 {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(\d+)(?:st|nd|rd|th)\s+modif").unwrap());

    let lower = label.to_lowercase();
    if lower.contains("modif") || lower.contains("amend") || lower.contains("corrig") {
        re.captures(&lower)
            .and_then(|caps| caps[1].parse().ok())
            .unwrap_or(1)
    } else {
        0
    }
}

#[async_trait]
impl DisclosureSource for EuParliamentSource {
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
        let max_meps = params
            .get("max_meps")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_MAX_MEPS);
        let download_pdfs = params
            .get("download_pdfs")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        let fetcher = HttpFetcher::new(&self.config)?;
        let meps = self.fetch_roster(&fetcher).await?;

        if meps.is_empty() {
            return Err(SourceError::Parse("MEP roster XML yielded no members".to_string()));
        }

        let mut records = Vec::new();
        for (index, mep) in meps.iter().take(max_meps).enumerate() {
            let declarations = match self.fetch_declarations(&fetcher, mep).await {
                Ok(declarations) => declarations,
                Err(e) => {
                    warn!(error = %e, mep = %mep.full_name, "Failed to fetch declarations");
                    continue;
                }
            };

            for declaration in &declarations {
                if download_pdfs {
                    if let Err(e) = self.download_dpi(&fetcher, mep, declaration).await {
                        warn!(error = %e, url = %declaration.pdf_url, "DPI download failed");
                    }
                }

                let date = declaration
                    .date
                    .unwrap_or_else(|| Utc::now().date_naive())
                    .to_string();
                records.push(record_from_pairs(vec![
                    ("politician_name", json!(mep.full_name)),
                    ("country", json!(mep.country)),
                    ("party", json!(mep.political_group)),
                    ("national_party", json!(mep.national_party)),
                    ("transaction_date", json!(date)),
                    ("disclosure_date", json!(date)),
                    ("asset_name", json!(declaration.label)),
                    ("transaction_type", json!("purchase")),
                    ("revision", json!(declaration.revision)),
                    ("source_url", json!(declaration.pdf_url)),
                    ("document_id", json!(format!("dpi-{}-{}", mep.mep_id, declaration.revision))),
                ]));
            }

            if index > 0 && index % 10 == 0 {
                info!(processed = index, "Processed MEP profiles");
            }
        }

        info!(count = records.len(), "Collected EU Parliament declarations");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROSTER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<meps>
  <mep>
    <id>256810</id>
    <fullName>Mika AALTOLA</fullName>
    <country>Finland</country>
    <politicalGroup>Group of the European People's Party (Christian Democrats)</politicalGroup>
    <nationalPoliticalGroup>Kansallinen Kokoomus</nationalPoliticalGroup>
  </mep>
  <mep>
    <id>197400</id>
    <fullName>María Teresa GIMÉNEZ BARBAT</fullName>
    <country>Spain</country>
    <politicalGroup>Renew Europe Group</politicalGroup>
    <nationalPoliticalGroup>Independiente</nationalPoliticalGroup>
  </mep>
</meps>"#;

    #[test]
    fn test_parse_mep_xml() {
        let meps = parse_mep_xml(ROSTER_XML);
        assert_eq!(meps.len(), 2);
        assert_eq!(meps[0].mep_id, "256810");
        assert_eq!(meps[0].full_name, "Mika AALTOLA");
        assert_eq!(meps[0].country, "Finland");
        assert_eq!(meps[1].national_party, "Independiente");
    }

    #[test]
    fn test_name_to_slug_folds_accents() {
        assert_eq!(name_to_slug("Mika AALTOLA"), "Mika+AALTOLA");
        assert_eq!(
            name_to_slug("María Teresa GIMÉNEZ BARBAT"),
            "Maria+Teresa+GIMENEZ+BARBAT"
        );
    }

    #[test]
    fn test_parse_declarations_html() {
        let html = r#"
        <html><body>
        <a href="/erpl-app-public/mep-documents/DPI/10/256810/256810_20240716_decl.pdf">Declaration of private interests</a>
        <a href="/erpl-app-public/mep-documents/DPI/10/256810/256810_20240901_mod.pdf">1st modification</a>
        <a href="/some/other/page.html">Not a declaration</a>
        <a href="/docs/notdpi/file.pdf">Wrong folder</a>
        </body></html>
        "#;

        let declarations = parse_declarations_html(html, "https://www.europarl.europa.eu");
        assert_eq!(declarations.len(), 2);

        assert_eq!(declarations[0].revision, 0);
        assert_eq!(declarations[0].date, NaiveDate::from_ymd_opt(2024, 7, 16));
        assert!(declarations[0].pdf_url.starts_with("https://www.europarl.europa.eu/"));

        assert_eq!(declarations[1].revision, 1);
        assert_eq!(declarations[1].date, NaiveDate::from_ymd_opt(2024, 9, 1));
    }

    #[test]
    fn test_parse_revision_variants() {
        assert_eq!(parse_revision("Declaration of private interests"), 0);
        assert_eq!(parse_revision("1st modification"), 1);
        assert_eq!(parse_revision("3rd modification"), 3);
        assert_eq!(parse_revision("Corrigendum"), 1);
    }

    #[test]
    fn test_date_out_of_range_rejected() {
        assert_eq!(extract_date_from_path("/DPI/10/1/1_19800101_x.pdf"), None);
        assert_eq!(
            extract_date_from_path("/DPI/10/1/1_20240716_x.pdf"),
            NaiveDate::from_ymd_opt(2024, 7, 16)
        );
    }
}
