//! Politician data normalization and ticker auto-correction batch jobs.
//!
//! Both jobs rewrite live rows, so every edit is logged to the
//! data_quality_corrections audit table with old/new values.

use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::transformers::ticker::TICKER_REBRANDS;
use tradewatch_db::{DbError, NewCorrection, TradewatchDb};

/// Canonical role values recognized by the system.
pub const CANONICAL_ROLES: &[&str] = &["Representative", "Senator", "MEP"];

/// Non-canonical role values mapped to their canonical form. Keys are
/// lowercase for case-insensitive matching.
const ROLE_MAP: &[(&str, &str)] = &[
    ("us_house_representative", "Representative"),
    ("us_house_rep", "Representative"),
    ("senate", "Senator"),
    ("us_senator", "Senator"),
    ("house", "Representative"),
    ("congress", "Representative"),
    ("state official", "Representative"),
    ("rep", "Representative"),
    ("rep.", "Representative"),
    ("sen", "Senator"),
    ("sen.", "Senator"),
    ("member of european parliament", "MEP"),
    ("mep", "MEP"),
    ("eu parliament", "MEP"),
    ("eu_mep", "MEP"),
];

/// Honorific prefixes stripped from names.
const HONORIFIC_PREFIXES: &[&str] = &[
    "Hon. ",
    "Hon ",
    "The Honorable ",
    "Honorable ",
    "Mr. ",
    "Mrs. ",
    "Ms. ",
    "Dr. ",
    "Sen. ",
    "Rep. ",
    "Senator ",
    "Representative ",
    "Congressman ",
    "Congresswoman ",
];

/// Placeholder names are skipped during name standardization.
const PLACEHOLDER_PATTERNS: &[&str] = &["^placeholder", "^unknown", "^pending", "^tbd", "^n/a"];

fn state_from_district_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Z]{2})\d+$").unwrap())
}

/// Counters from one normalization step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub scanned: u64,
    pub corrections: u64,
    pub errors: u64,
}

/// Normalizes politician rows: canonical roles, honorific-free names,
/// and state backfill from district codes.
pub struct PoliticianNormalizer {
    db: TradewatchDb,
    dry_run: bool,
}

impl PoliticianNormalizer {
    pub fn new(db: TradewatchDb) -> Self {
        Self { db, dry_run: false }
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Run every normalization step in order.
    pub async fn normalize_all(&self, limit: usize) -> Result<NormalizeReport, DbError> {
        let mut total = NormalizeReport::default();
        for report in [
            self.normalize_roles(limit).await?,
            self.standardize_names(limit).await?,
            self.backfill_state_country(limit).await?,
        ] {
            total.scanned += report.scanned;
            total.corrections += report.corrections;
            total.errors += report.errors;
        }
        info!(
            corrections = total.corrections,
            errors = total.errors,
            dry_run = self.dry_run,
            "Politician normalization complete"
        );
        Ok(total)
    }

    /// Rewrite non-canonical roles to their canonical value.
    pub async fn normalize_roles(&self, limit: usize) -> Result<NormalizeReport, DbError> {
        let mut report = NormalizeReport::default();

        for politician in self.db.list_politicians().await?.into_iter().take(limit) {
            report.scanned += 1;
            let role = politician.role.trim();
            if role.is_empty() || CANONICAL_ROLES.contains(&role) {
                continue;
            }

            let Some(canonical) = map_role(role) else {
                continue;
            };

            debug!(id = %politician.id, from = role, to = canonical, "Normalizing role");
            if !self.dry_run {
                self.db.update_politician_role(&politician.id, canonical).await?;
            }
            self.audit(
                &politician.id,
                "role",
                "role_normalization",
                Some(role),
                Some(canonical),
            )
            .await?;
            report.corrections += 1;
        }

        Ok(report)
    }

    /// Strip honorific prefixes from names, leaving placeholders alone.
    pub async fn standardize_names(&self, limit: usize) -> Result<NormalizeReport, DbError> {
        let mut report = NormalizeReport::default();

        for politician in self.db.list_politicians().await?.into_iter().take(limit) {
            report.scanned += 1;

            if is_placeholder(&politician.full_name) {
                continue;
            }

            let cleaned_first = strip_honorifics(&politician.first_name);
            let cleaned_full = strip_honorifics(&politician.full_name);
            if cleaned_first == politician.first_name && cleaned_full == politician.full_name {
                continue;
            }

            if !self.dry_run {
                self.db
                    .update_politician_name(
                        &politician.id,
                        &cleaned_first,
                        &politician.last_name,
                        &cleaned_full,
                    )
                    .await?;
            }
            self.audit(
                &politician.id,
                "full_name",
                "name_standardization",
                Some(&politician.full_name),
                Some(&cleaned_full),
            )
            .await?;
            report.corrections += 1;
        }

        Ok(report)
    }

    /// Backfill missing state_or_country from a `CA12`-style district.
    /// Empty strings count as missing.
    pub async fn backfill_state_country(&self, limit: usize) -> Result<NormalizeReport, DbError> {
        let mut report = NormalizeReport::default();

        for politician in self.db.list_politicians().await?.into_iter().take(limit) {
            report.scanned += 1;

            if politician.state_or_country.is_some() {
                continue;
            }
            let Some(district) = &politician.district else {
                continue;
            };
            let Some(caps) = state_from_district_re().captures(district) else {
                continue;
            };
            let state = caps[1].to_string();

            if !self.dry_run {
                self.db.update_politician_state(&politician.id, &state).await?;
            }
            self.audit(
                &politician.id,
                "state_or_country",
                "state_backfill",
                None,
                Some(&state),
            )
            .await?;
            report.corrections += 1;
        }

        Ok(report)
    }

    async fn audit(
        &self,
        record_id: &str,
        field: &str,
        correction_type: &str,
        old_value: Option<&str>,
        new_value: Option<&str>,
    ) -> Result<(), DbError> {
        self.db
            .insert_correction(&NewCorrection {
                table_name: "politicians".to_string(),
                record_id: record_id.to_string(),
                field_name: field.to_string(),
                correction_type: correction_type.to_string(),
                old_value: old_value.map(str::to_string),
                new_value: new_value.map(str::to_string),
                confidence: 1.0,
                corrected_by: "politician_normalizer".to_string(),
                status: if self.dry_run { "preview" } else { "applied" }.to_string(),
            })
            .await?;
        Ok(())
    }
}

/// Rewrites known rebranded tickers on disclosures, with audit rows at
/// confidence 1.0.
pub struct TickerAutoCorrector {
    db: TradewatchDb,
}

impl TickerAutoCorrector {
    pub fn new(db: TradewatchDb) -> Self {
        Self { db }
    }

    pub async fn run(&self) -> Result<NormalizeReport, DbError> {
        let mut report = NormalizeReport::default();

        for (old, new) in TICKER_REBRANDS {
            let rows = self.db.disclosures_with_ticker(old).await?;
            for row in rows {
                report.scanned += 1;
                self.db.update_disclosure_ticker(&row.id, new).await?;
                self.db
                    .insert_correction(&NewCorrection {
                        table_name: "trading_disclosures".to_string(),
                        record_id: row.id.clone(),
                        field_name: "asset_ticker".to_string(),
                        correction_type: "ticker_cleanup".to_string(),
                        old_value: Some((*old).to_string()),
                        new_value: Some((*new).to_string()),
                        confidence: 1.0,
                        corrected_by: "ticker_auto_corrector".to_string(),
                        status: "applied".to_string(),
                    })
                    .await?;
                report.corrections += 1;
            }
        }

        info!(corrections = report.corrections, "Ticker auto-correction complete");
        Ok(report)
    }
}

fn map_role(role: &str) -> Option<&'static str> {
    let lower = role.to_lowercase();
    for (key, canonical) in ROLE_MAP {
        if lower == *key {
            return Some(canonical);
        }
    }
    // Prefix patterns like "representative-elect".
    for (key, canonical) in ROLE_MAP {
        if lower.starts_with(key) {
            return Some(canonical);
        }
    }
    None
}

pub(crate) fn strip_honorifics(name: &str) -> String {
    let mut cleaned = name.trim().to_string();
    let mut changed = true;
    while changed {
        changed = false;
        for prefix in HONORIFIC_PREFIXES {
            if let Some(rest) = cleaned.strip_prefix(prefix) {
                cleaned = rest.trim_start().to_string();
                changed = true;
            }
        }
    }
    cleaned
}

fn is_placeholder(name: &str) -> bool {
    let lower = name.trim().to_lowercase();
    PLACEHOLDER_PATTERNS.iter().any(|pattern| {
        Regex::new(pattern)
            .map(|re| re.is_match(&lower))
            .unwrap_or(false)
    })
}
