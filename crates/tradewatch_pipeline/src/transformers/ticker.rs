//! Ticker extraction from asset names.

use regex::Regex;
use std::sync::OnceLock;

/// Rebranded/merged tickers mapped to their current symbols.
pub const TICKER_REBRANDS: &[(&str, &str)] = &[
    ("FB", "META"),
    ("TWTR", "X"),
    ("ANTM", "ELV"),
    ("ATVI", "MSFT"),
    ("DISCA", "WBD"),
    ("DISCK", "WBD"),
    ("VIAC", "PARA"),
    ("VIACA", "PARA"),
];

/// Curated company-name fragments to tickers, matched case-insensitively
/// as substrings. Order matters: more specific names first.
const COMPANY_TICKERS: &[(&str, &str)] = &[
    ("meta platforms", "META"),
    ("facebook", "META"),
    ("alphabet", "GOOGL"),
    ("google", "GOOGL"),
    ("apple", "AAPL"),
    ("microsoft", "MSFT"),
    ("amazon", "AMZN"),
    ("tesla", "TSLA"),
    ("nvidia", "NVDA"),
    ("netflix", "NFLX"),
    ("advanced micro", "AMD"),
    ("broadcom", "AVGO"),
    ("qualcomm", "QCOM"),
    ("texas instruments", "TXN"),
    ("salesforce", "CRM"),
    ("oracle", "ORCL"),
    ("cisco", "CSCO"),
    ("adobe", "ADBE"),
    ("paypal", "PYPL"),
    ("intel", "INTC"),
    ("jpmorgan", "JPM"),
    ("jp morgan", "JPM"),
    ("goldman sachs", "GS"),
    ("morgan stanley", "MS"),
    ("bank of america", "BAC"),
    ("wells fargo", "WFC"),
    ("citigroup", "C"),
    ("berkshire", "BRK.B"),
    ("exxon", "XOM"),
    ("chevron", "CVX"),
    ("pfizer", "PFE"),
    ("johnson & johnson", "JNJ"),
    ("johnson and johnson", "JNJ"),
    ("procter & gamble", "PG"),
    ("procter and gamble", "PG"),
    ("coca-cola", "KO"),
    ("coca cola", "KO"),
    ("pepsico", "PEP"),
    ("walmart", "WMT"),
    ("home depot", "HD"),
    ("costco", "COST"),
    ("starbucks", "SBUX"),
    ("mcdonald", "MCD"),
    ("walt disney", "DIS"),
    ("boeing", "BA"),
    ("visa inc", "V"),
    ("mastercard", "MA"),
];

fn paren_ticker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(([A-Z]{1,5})\)").unwrap())
}

/// Pulls ticker symbols out of asset names.
pub struct TickerExtractor;

impl TickerExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract a ticker: parenthesized symbol first, then the curated
    /// company map, then the rebrand map on whatever was found.
    pub fn extract(&self, asset_name: &str) -> Option<String> {
        if let Some(caps) = paren_ticker_re().captures(asset_name) {
            return Some(Self::canonicalize(&caps[1]));
        }

        let lower = asset_name.to_lowercase();
        for (fragment, ticker) in COMPANY_TICKERS {
            if lower.contains(fragment) {
                return Some(Self::canonicalize(ticker));
            }
        }

        None
    }

    /// Map a rebranded symbol to its current one; pass others through.
    pub fn canonicalize(ticker: &str) -> String {
        let upper = ticker.trim().to_uppercase();
        for (old, new) in TICKER_REBRANDS {
            if upper == *old {
                return (*new).to_string();
            }
        }
        upper
    }
}

impl Default for TickerExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parenthesized_ticker_wins() {
        let extractor = TickerExtractor::new();
        assert_eq!(extractor.extract("Apple Inc (AAPL)").as_deref(), Some("AAPL"));
        assert_eq!(
            extractor.extract("Microsoft Corporation (MSFT) common stock").as_deref(),
            Some("MSFT")
        );
    }

    #[test]
    fn test_company_map_fallback() {
        let extractor = TickerExtractor::new();
        assert_eq!(extractor.extract("Apple Inc common shares").as_deref(), Some("AAPL"));
        assert_eq!(extractor.extract("shares of Tesla").as_deref(), Some("TSLA"));
        assert_eq!(extractor.extract("Meta Platforms Class A").as_deref(), Some("META"));
    }

    #[test]
    fn test_rebrands_apply_to_extracted_tickers() {
        let extractor = TickerExtractor::new();
        // An old filing still says (FB).
        assert_eq!(extractor.extract("Facebook Inc (FB)").as_deref(), Some("META"));
        assert_eq!(TickerExtractor::canonicalize("TWTR"), "X");
        assert_eq!(TickerExtractor::canonicalize("ATVI"), "MSFT");
        assert_eq!(TickerExtractor::canonicalize("DISCA"), "WBD");
        assert_eq!(TickerExtractor::canonicalize("VIAC"), "PARA");
        assert_eq!(TickerExtractor::canonicalize("ANTM"), "ELV");
        // Unmapped symbols pass through uppercased.
        assert_eq!(TickerExtractor::canonicalize("aapl"), "AAPL");
    }

    #[test]
    fn test_no_ticker_found() {
        let extractor = TickerExtractor::new();
        assert_eq!(extractor.extract("Municipal bond fund"), None);
        assert_eq!(extractor.extract("(lowercase)"), None);
        assert_eq!(extractor.extract("(TOOLONG)"), None);
    }
}
