//! Date parsing for heterogeneous disclosure sources.
//!
//! Sources disagree wildly on date formats. Parsing walks an ordered
//! format list; first match wins, no match returns None.

use chrono::{NaiveDate, NaiveDateTime};

/// Date-only formats tried before the datetime variants.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%Y/%m/%d",
    "%B %d, %Y",
    "%b %d, %Y",
];

/// ISO datetime variants seen in API payloads.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%SZ",
];

/// Parse a disclosure date from any supported format.
pub fn parse_disclosure_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(date);
        }
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt.date());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_supported_format_parses() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let samples = [
            "2024-01-15",
            "01/15/2024",
            "01-15-2024",
            "2024/01/15",
            "January 15, 2024",
            "Jan 15, 2024",
            "2024-01-15T09:30:00",
            "2024-01-15T09:30:00.123",
            "2024-01-15T09:30:00Z",
        ];
        for sample in samples {
            assert_eq!(parse_disclosure_date(sample), Some(expected), "format: {sample}");
        }
    }

    #[test]
    fn test_unparseable_inputs_return_none() {
        for sample in ["", "   ", "not a date", "15.01.2024", "2024-13-40"] {
            assert_eq!(parse_disclosure_date(sample), None, "input: {sample}");
        }
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        assert_eq!(
            parse_disclosure_date("  2024-01-15  "),
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
    }
}
