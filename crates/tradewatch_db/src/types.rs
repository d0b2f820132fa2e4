//! Entity types for all Tradewatch database tables.
//!
//! These are persistence-shaped rows; pipeline record types live in
//! `tradewatch_protocol`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Politicians
// ============================================================================

/// A politician row. Never deleted; mutated only by the publisher upsert
/// and the normalizer batch job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Politician {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub role: String,
    pub party: Option<String>,
    pub state_or_country: Option<String>,
    pub district: Option<String>,
    pub chamber: Option<String>,
    pub bioguide_id: Option<String>,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Politician {
    pub fn new(first_name: &str, last_name: &str, role: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            full_name: format!("{first_name} {last_name}").trim().to_string(),
            role: role.to_string(),
            party: None,
            state_or_country: None,
            district: None,
            chamber: None,
            bioguide_id: None,
            source: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_full_name(mut self, full_name: &str) -> Self {
        self.full_name = full_name.to_string();
        self
    }

    pub fn with_party(mut self, party: Option<String>) -> Self {
        self.party = none_if_blank(party);
        self
    }

    pub fn with_state(mut self, state: Option<String>) -> Self {
        self.state_or_country = none_if_blank(state);
        self
    }

    pub fn with_bioguide_id(mut self, bioguide_id: Option<String>) -> Self {
        self.bioguide_id = none_if_blank(bioguide_id);
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn with_district(mut self, district: Option<String>) -> Self {
        self.district = none_if_blank(district);
        self
    }

    pub fn with_chamber(mut self, chamber: Option<String>) -> Self {
        self.chamber = none_if_blank(chamber);
        self
    }
}

/// Empty strings are treated as missing throughout the politician model.
pub fn none_if_blank(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

// ============================================================================
// Trading disclosures
// ============================================================================

/// A published disclosure row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisclosureRow {
    pub id: String,
    pub politician_id: String,
    pub transaction_date: NaiveDate,
    pub disclosure_date: NaiveDate,
    pub transaction_type: String,
    pub asset_name: String,
    pub asset_ticker: Option<String>,
    pub asset_type: Option<String>,
    pub amount_range_min: Option<f64>,
    pub amount_range_max: Option<f64>,
    pub amount_exact: Option<f64>,
    pub source: Option<String>,
    pub source_url: Option<String>,
    pub source_document_id: Option<String>,
    pub raw_data: serde_json::Value,
    pub status: String,
    pub has_raw_pdf: bool,
    pub has_parsed_data: bool,
    pub source_file_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for a disclosure insert.
#[derive(Debug, Clone)]
pub struct NewDisclosure {
    pub politician_id: String,
    pub transaction_date: NaiveDate,
    pub disclosure_date: NaiveDate,
    pub transaction_type: String,
    pub asset_name: String,
    pub asset_ticker: Option<String>,
    pub asset_type: Option<String>,
    pub amount_range_min: Option<f64>,
    pub amount_range_max: Option<f64>,
    pub amount_exact: Option<f64>,
    pub source: Option<String>,
    pub source_url: Option<String>,
    pub source_document_id: Option<String>,
    pub raw_data: serde_json::Value,
}

/// Mutable fields for a disclosure update. `transaction_type` is part of
/// the idempotence key and is never updated.
#[derive(Debug, Clone)]
pub struct DisclosureUpdate {
    pub asset_ticker: Option<String>,
    pub asset_type: Option<String>,
    pub amount_range_min: Option<f64>,
    pub amount_range_max: Option<f64>,
    pub amount_exact: Option<f64>,
    pub source_url: Option<String>,
    pub raw_data: serde_json::Value,
}

// ============================================================================
// Stored files
// ============================================================================

/// Parse status of a stored raw artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseStatus {
    Pending,
    Success,
    Failed,
}

impl ParseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata row for a blob in a storage bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: String,
    pub disclosure_id: Option<String>,
    pub storage_bucket: String,
    pub storage_path: String,
    pub file_type: String,
    pub file_size_bytes: i64,
    pub file_hash_sha256: String,
    pub mime_type: String,
    pub source_url: Option<String>,
    pub source_type: String,
    pub parse_status: ParseStatus,
    pub parse_error: Option<String>,
    pub transactions_found: i64,
    pub parsed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Input for a stored-file metadata insert.
#[derive(Debug, Clone)]
pub struct NewStoredFile {
    pub disclosure_id: Option<String>,
    pub storage_bucket: String,
    pub storage_path: String,
    pub file_type: String,
    pub file_size_bytes: i64,
    pub file_hash_sha256: String,
    pub mime_type: String,
    pub source_url: Option<String>,
    pub source_type: String,
    pub parse_status: ParseStatus,
    pub transactions_found: i64,
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Scheduled jobs
// ============================================================================

/// How a durable job is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    Cron,
    Interval,
}

impl ScheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cron => "cron",
            Self::Interval => "interval",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cron" => Some(Self::Cron),
            "interval" => Some(Self::Interval),
            _ => None,
        }
    }
}

/// Durable job definition. The scheduled_jobs table is the source of truth
/// for schedules; the in-memory scheduler is rebuilt from it on startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    pub job_id: String,
    pub job_name: String,
    /// Registered runner name resolved through the scheduler's registry.
    pub job_function: String,
    pub schedule_type: ScheduleType,
    /// Cron expression, or interval seconds as a decimal string.
    pub schedule_value: String,
    pub enabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_scheduled_run: Option<DateTime<Utc>>,
    pub consecutive_failures: i64,
    pub max_consecutive_failures: i64,
    pub auto_retry_on_startup: bool,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Status of one job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One execution of a scheduled job, with captured logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: String,
    pub job_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub error_message: Option<String>,
    /// Newline-joined captured log lines.
    pub logs: String,
    pub metadata: serde_json::Value,
}

// ============================================================================
// Data quality corrections
// ============================================================================

/// Audit row for an automated data correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCorrection {
    pub table_name: String,
    pub record_id: String,
    pub field_name: String,
    pub correction_type: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub confidence: f64,
    pub corrected_by: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_roundtrip() {
        for status in [ParseStatus::Pending, ParseStatus::Success, ParseStatus::Failed] {
            assert_eq!(ParseStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_execution_status_roundtrip() {
        for status in [
            ExecutionStatus::Queued,
            ExecutionStatus::Running,
            ExecutionStatus::Success,
            ExecutionStatus::Failed,
        ] {
            assert_eq!(ExecutionStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_blank_state_is_missing() {
        let p = Politician::new("Nancy", "Pelosi", "Representative")
            .with_state(Some("   ".to_string()));
        assert_eq!(p.state_or_country, None);

        let p = Politician::new("Nancy", "Pelosi", "Representative")
            .with_state(Some("CA".to_string()));
        assert_eq!(p.state_or_country.as_deref(), Some("CA"));
    }
}
