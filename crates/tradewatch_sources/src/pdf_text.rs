//! Pluggable PDF text extraction and transaction recovery.
//!
//! The extractor seam keeps OCR backends out of this crate: implementations
//! may use a native text layer or rasterize (300 DPI) and OCR. Extraction
//! failure returns an empty string and the caller skips transaction
//! recovery for that document.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

/// Given PDF bytes, return UTF-8 text. Empty string on failure.
pub trait PdfTextExtractor: Send + Sync {
    fn extract_text(&self, pdf_bytes: &[u8]) -> String;
}

/// Extractor that recovers nothing. Used when PDF parsing is disabled.
pub struct NullPdfTextExtractor;

impl PdfTextExtractor for NullPdfTextExtractor {
    fn extract_text(&self, _pdf_bytes: &[u8]) -> String {
        String::new()
    }
}

/// One transaction recovered from disclosure PDF text.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfTransaction {
    pub ticker: String,
    pub asset_name: String,
    pub transaction_type: String,
    pub transaction_date: Option<NaiveDate>,
    pub amount_min: Option<f64>,
    pub amount_max: Option<f64>,
    pub amount_exact: Option<f64>,
    pub raw_snippet: String,
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap())
}

fn standalone_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|\s)([PSE])(?:\s|$)").unwrap())
}

fn range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$(\d+)\s*-\s*\$(\d+)").unwrap())
}

fn exact_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$(\d+(?:\.\d{2})?)").unwrap())
}

/// Extract transactions from extracted/OCR'd PDF text.
///
/// Sections are paragraphs (double-newline separated). A section yields a
/// transaction only when both a type token and a parenthesized ticker are
/// present.
pub fn extract_transactions_from_text(text: &str) -> Vec<PdfTransaction> {
    let mut transactions = Vec::new();

    for section in text.split("\n\n") {
        let line = section.replace(['\r', '\n'], " ");

        let Some(transaction_type) = detect_transaction_type(&line) else {
            continue;
        };

        let Some((ticker, ticker_start)) = extract_parenthesized_ticker(&line) else {
            continue;
        };

        // Asset name: up to the last five words before the ticker.
        let before = line[..ticker_start].trim();
        let words: Vec<&str> = before.split_whitespace().collect();
        let asset_name = if words.len() >= 2 {
            let take = words.len().min(5);
            words[words.len() - take..].join(" ")
        } else {
            ticker.clone()
        };

        let (amount_min, amount_max, amount_exact) = parse_pdf_amount(&line);

        let transaction_date = date_re().captures(&line).and_then(|caps| {
            let month: u32 = caps[1].parse().ok()?;
            let day: u32 = caps[2].parse().ok()?;
            let year: i32 = caps[3].parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        });

        let snippet: String = line.chars().take(200).collect();
        transactions.push(PdfTransaction {
            ticker,
            asset_name,
            transaction_type,
            transaction_date,
            amount_min,
            amount_max,
            amount_exact,
            raw_snippet: snippet,
        });
    }

    transactions
}

/// Transaction-type tokens: standalone `P`/`S`/`E` adjacent to the rest of
/// the row, plus the spelled-out words.
fn detect_transaction_type(line: &str) -> Option<String> {
    let lower = line.to_lowercase();

    if lower.contains("purchase") || lower.contains("bought") || lower.contains("buy") {
        return Some("purchase".to_string());
    }
    if lower.contains("sale") || lower.contains("sold") || lower.contains("sell") {
        return Some("sale".to_string());
    }
    if lower.contains("exchange") {
        return Some("exchange".to_string());
    }

    // Standalone code only counts next to a date: OCR noise produces
    // plenty of stray capitals.
    if date_re().is_match(line) {
        if let Some(caps) = standalone_code_re().captures(line) {
            return Some(match &caps[1] {
                "P" => "purchase".to_string(),
                "S" => "sale".to_string(),
                _ => "exchange".to_string(),
            });
        }
    }

    None
}

/// Tickers appear in parentheses as 1-5 uppercase letters. Returns the
/// ticker and the byte offset of its opening parenthesis.
fn extract_parenthesized_ticker(line: &str) -> Option<(String, usize)> {
    let close = line.find(')')?;
    let open = line[..close].rfind('(')?;
    let candidate = line[open + 1..close].trim();

    if !candidate.is_empty()
        && candidate.len() <= 5
        && candidate.chars().all(|c| c.is_ascii_uppercase())
    {
        Some((candidate.to_string(), open))
    } else {
        None
    }
}

/// OCR-tolerant amount parsing: standard ranges with optional dropped
/// commas, then ad-hoc `$X - $Y`, then a single `$X`.
fn parse_pdf_amount(line: &str) -> (Option<f64>, Option<f64>, Option<f64>) {
    let text = line.replace(',', "");

    const STANDARD: &[(&str, f64, Option<f64>)] = &[
        (r"\$1001\s*-\s*\$15000", 1001.0, Some(15000.0)),
        (r"\$15001\s*-\s*\$50000", 15001.0, Some(50000.0)),
        (r"\$50001\s*-\s*\$100000", 50001.0, Some(100000.0)),
        (r"\$100001\s*-\s*\$250000", 100001.0, Some(250000.0)),
        (r"\$250001\s*-\s*\$500000", 250001.0, Some(500000.0)),
        (r"\$500001\s*-\s*\$1000000", 500001.0, Some(1000000.0)),
        (r"\$1000001\s*-\s*\$5000000", 1000001.0, Some(5000000.0)),
        (r"\$5000001\s*-\s*\$25000000", 5000001.0, Some(25000000.0)),
        (r"\$25000001\s*-\s*\$50000000", 25000001.0, Some(50000000.0)),
        (r"(?i)Over\s+\$50000000", 50000001.0, None),
    ];

    for (pattern, min, max) in STANDARD {
        // Patterns are fixed strings; compilation cannot fail.
        if Regex::new(pattern).map(|re| re.is_match(&text)).unwrap_or(false) {
            return (Some(*min), *max, None);
        }
    }

    if let Some(caps) = range_re().captures(&text) {
        let min = caps[1].parse().ok();
        let max = caps[2].parse().ok();
        if min.is_some() || max.is_some() {
            return (min, max, None);
        }
    }

    if let Some(caps) = exact_re().captures(&text) {
        if let Ok(exact) = caps[1].parse() {
            return (None, None, Some(exact));
        }
    }

    (None, None, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_purchase_with_ticker_and_range() {
        let text = "Apple Inc (AAPL) P 01/15/2024 $1,001 - $15,000\n\nunrelated text";
        let txns = extract_transactions_from_text(text);

        assert_eq!(txns.len(), 1);
        let t = &txns[0];
        assert_eq!(t.ticker, "AAPL");
        assert_eq!(t.transaction_type, "purchase");
        assert_eq!(t.transaction_date, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(t.amount_min, Some(1001.0));
        assert_eq!(t.amount_max, Some(15000.0));
        assert_eq!(t.amount_exact, None);
    }

    #[test]
    fn test_spelled_out_sale() {
        let text = "Sold shares of Microsoft Corporation (MSFT) $50,001 - $100,000";
        let txns = extract_transactions_from_text(text);
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].transaction_type, "sale");
        assert_eq!(txns[0].amount_min, Some(50001.0));
    }

    #[test]
    fn test_standalone_code_requires_date() {
        // A stray "S" without any date in the section is OCR noise.
        let text = "Some Company (ACME) S holdings statement";
        assert!(extract_transactions_from_text(text).is_empty());
    }

    #[test]
    fn test_section_without_ticker_is_skipped() {
        let text = "Purchase of municipal bonds 01/15/2024 $15,001 - $50,000";
        assert!(extract_transactions_from_text(text).is_empty());
    }

    #[test]
    fn test_lowercase_parenthetical_is_not_a_ticker() {
        assert_eq!(extract_parenthesized_ticker("Fund (various) holdings"), None);
        assert_eq!(
            extract_parenthesized_ticker("Meta Platforms (META)"),
            Some(("META".to_string(), 15))
        );
    }

    #[test]
    fn test_ocr_amount_without_commas() {
        let (min, max, exact) = parse_pdf_amount("P 01/02/2024 $15001 - $50000");
        assert_eq!(min, Some(15001.0));
        assert_eq!(max, Some(50000.0));
        assert_eq!(exact, None);
    }

    #[test]
    fn test_exact_amount_fallback() {
        let (min, max, exact) = parse_pdf_amount("purchase $25,000 total");
        assert_eq!(min, None);
        assert_eq!(max, None);
        assert_eq!(exact, Some(25000.0));
    }
}
