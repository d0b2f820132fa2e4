//! Amount-range parsing.
//!
//! US disclosures report value ranges rather than exact amounts. The ten
//! STOCK-Act buckets match verbatim; everything else falls through a
//! regex ladder: `$X - $Y`, then over/under bounds, then a single `$X`.

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// The ten standard disclosure ranges, display string to `(min, max)`.
const STANDARD_RANGES: &[(&str, f64, Option<f64>)] = &[
    ("$1,001 - $15,000", 1001.0, Some(15000.0)),
    ("$15,001 - $50,000", 15001.0, Some(50000.0)),
    ("$50,001 - $100,000", 50001.0, Some(100000.0)),
    ("$100,001 - $250,000", 100001.0, Some(250000.0)),
    ("$250,001 - $500,000", 250001.0, Some(500000.0)),
    ("$500,001 - $1,000,000", 500001.0, Some(1000000.0)),
    ("$1,000,001 - $5,000,000", 1000001.0, Some(5000000.0)),
    ("$5,000,001 - $25,000,000", 5000001.0, Some(25000000.0)),
    ("$25,000,001 - $50,000,000", 25000001.0, Some(50000000.0)),
    ("Over $50,000,000", 50000001.0, None),
];

fn range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\s*([\d,]+(?:\.\d{2})?)\s*[-–]\s*\$\s*([\d,]+(?:\.\d{2})?)").unwrap()
    })
}

fn over_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?:over|above|>)\s*\$\s*([\d,]+(?:\.\d{2})?)").unwrap())
}

fn under_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:under|below|less than|<)\s*\$\s*([\d,]+(?:\.\d{2})?)").unwrap()
    })
}

fn single_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\s*([\d,]+(?:\.\d{2})?)").unwrap())
}

/// Parses amount text into `(min, max, exact)`. At most one of `max` and
/// `exact` is populated.
pub struct AmountParser;

impl AmountParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, amount_text: Option<&str>) -> (Option<f64>, Option<f64>, Option<f64>) {
        let Some(text) = amount_text else {
            return (None, None, None);
        };
        let text = text.trim();
        if text.is_empty() {
            return (None, None, None);
        }

        // Standard ranges match the full display string.
        for (display, min, max) in STANDARD_RANGES {
            if text == *display {
                debug!(%text, min, ?max, "Matched standard range");
                return (Some(*min), *max, None);
            }
        }

        if let Some(caps) = range_re().captures(text) {
            if let (Some(min), Some(max)) = (parse_number(&caps[1]), parse_number(&caps[2])) {
                return (Some(min), Some(max), None);
            }
        }

        if let Some(caps) = over_re().captures(text) {
            if let Some(min) = parse_number(&caps[1]) {
                return (Some(min), None, None);
            }
        }

        if let Some(caps) = under_re().captures(text) {
            if let Some(max) = parse_number(&caps[1]) {
                return (None, Some(max), None);
            }
        }

        if let Some(caps) = single_re().captures(text) {
            if let Some(exact) = parse_number(&caps[1]) {
                return (None, None, Some(exact));
            }
        }

        debug!(%text, "Could not parse amount");
        (None, None, None)
    }
}

impl Default for AmountParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_number(text: &str) -> Option<f64> {
    text.replace(',', "").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_standard_range_roundtrips() {
        let parser = AmountParser::new();
        for (display, min, max) in STANDARD_RANGES {
            let (got_min, got_max, got_exact) = parser.parse(Some(display));
            assert_eq!(got_min, Some(*min), "range: {display}");
            assert_eq!(got_max, *max, "range: {display}");
            assert_eq!(got_exact, None, "range: {display}");
        }
    }

    #[test]
    fn test_over_sets_min_only() {
        let parser = AmountParser::new();
        assert_eq!(
            parser.parse(Some("Over $50,000,000")),
            (Some(50_000_001.0), None, None)
        );
        assert_eq!(parser.parse(Some("above $500")), (Some(500.0), None, None));
        assert_eq!(parser.parse(Some("> $1,000")), (Some(1000.0), None, None));
    }

    #[test]
    fn test_under_sets_max_only() {
        let parser = AmountParser::new();
        assert_eq!(parser.parse(Some("Under $15,000")), (None, Some(15000.0), None));
        assert_eq!(parser.parse(Some("less than $201")), (None, Some(201.0), None));
    }

    #[test]
    fn test_custom_range() {
        let parser = AmountParser::new();
        assert_eq!(
            parser.parse(Some("$2,500 - $7,500")),
            (Some(2500.0), Some(7500.0), None)
        );
        // En dash variant seen on Senate pages.
        assert_eq!(
            parser.parse(Some("$1,001 – $15,000")),
            (Some(1001.0), Some(15000.0), None)
        );
    }

    #[test]
    fn test_single_amount_is_exact() {
        let parser = AmountParser::new();
        assert_eq!(parser.parse(Some("$25,000")), (None, None, Some(25000.0)));
        assert_eq!(parser.parse(Some("$19.99")), (None, None, Some(19.99)));
    }

    #[test]
    fn test_unparseable_and_empty() {
        let parser = AmountParser::new();
        assert_eq!(parser.parse(None), (None, None, None));
        assert_eq!(parser.parse(Some("")), (None, None, None));
        assert_eq!(parser.parse(Some("undisclosed")), (None, None, None));
    }

    #[test]
    fn test_at_most_one_of_max_and_exact() {
        let parser = AmountParser::new();
        for input in ["$1,001 - $15,000", "Over $1,000", "Under $500", "$25,000"] {
            let (_, max, exact) = parser.parse(Some(input));
            assert!(max.is_none() || exact.is_none(), "input: {input}");
        }
    }
}
