//! Pipeline stage contracts: status, metrics, context, results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Execution status of a pipeline stage (or a whole run).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Pending,
    Running,
    Success,
    PartialSuccess,
    Failed,
    Skipped,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "partial_success" => Some(Self::PartialSuccess),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Decide a stage status from its counters.
    ///
    /// `records_output > 0` with no failures is success; with failures (or
    /// skips when `skips_demote` is set) partial success; zero output fails.
    pub fn from_counts(output: u64, failed: u64, skipped: u64, skips_demote: bool) -> Self {
        if output == 0 {
            return Self::Failed;
        }
        if failed == 0 && (!skips_demote || skipped == 0) {
            Self::Success
        } else {
            Self::PartialSuccess
        }
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Counters and messages collected while a stage runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineMetrics {
    pub records_input: u64,
    pub records_output: u64,
    pub records_skipped: u64,
    pub records_failed: u64,
    pub duration_seconds: f64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl PipelineMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.records_input == 0 {
            return 0.0;
        }
        (self.records_output as f64 / self.records_input as f64) * 100.0
    }

    /// Fold another stage's counters into a run-level summary.
    pub fn absorb(&mut self, other: &PipelineMetrics) {
        self.records_input += other.records_input;
        self.records_output += other.records_output;
        self.records_skipped += other.records_skipped;
        self.records_failed += other.records_failed;
        self.duration_seconds += other.duration_seconds;
        self.errors.extend(other.errors.iter().cloned());
        self.warnings.extend(other.warnings.iter().cloned());
    }
}

/// A recoverable stage-level error, kept alongside the metrics so the
/// orchestrator can report without unwinding.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum StageError {
    #[error("record {record}: {message}")]
    Record { record: String, message: String },

    #[error("stage error: {0}")]
    Stage(String),

    #[error("cancelled")]
    Cancelled,
}

/// Context passed by reference through all stages of one orchestrator run.
///
/// Read-only to stages apart from `metadata` additions; the cancellation
/// flag is shared with whoever launched the run.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub source_name: String,
    pub source_type: String,
    pub job_id: Option<String>,
    pub config: BTreeMap<String, serde_json::Value>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub started_at: DateTime<Utc>,
    cancel: Arc<AtomicBool>,
}

impl PipelineContext {
    pub fn new(source_name: &str, source_type: &str) -> Self {
        Self {
            source_name: source_name.to_string(),
            source_type: source_type.to_string(),
            job_id: None,
            config: BTreeMap::new(),
            metadata: BTreeMap::new(),
            started_at: Utc::now(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_job_id(mut self, job_id: &str) -> Self {
        self.job_id = Some(job_id.to_string());
        self
    }

    pub fn with_config(mut self, config: BTreeMap<String, serde_json::Value>) -> Self {
        self.config = config;
        self
    }

    /// String-valued config lookup.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }

    /// Boolean config lookup with default.
    pub fn config_bool(&self, key: &str, default: bool) -> bool {
        self.config.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    /// Integer config lookup with default.
    pub fn config_i64(&self, key: &str, default: i64) -> i64 {
        self.config.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
    }

    /// Handle for cancelling this run from outside.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

/// Result from one pipeline stage. Owns its output data; downstream stages
/// take ownership on consumption.
#[derive(Debug, Clone)]
pub struct PipelineResult<T> {
    pub status: PipelineStatus,
    pub data: Vec<T>,
    pub metrics: PipelineMetrics,
    pub stage_name: String,
    pub collected_errors: Vec<StageError>,
}

impl<T> PipelineResult<T> {
    pub fn new(stage_name: &str, status: PipelineStatus, data: Vec<T>, metrics: PipelineMetrics) -> Self {
        Self {
            status,
            data,
            metrics,
            stage_name: stage_name.to_string(),
            collected_errors: Vec::new(),
        }
    }

    /// An empty result for a stage that was disabled via configuration.
    pub fn skipped(stage_name: &str) -> Self {
        Self::new(stage_name, PipelineStatus::Skipped, Vec::new(), PipelineMetrics::default())
    }

    pub fn success(&self) -> bool {
        matches!(self.status, PipelineStatus::Success | PipelineStatus::PartialSuccess)
    }

    pub fn failed(&self) -> bool {
        self.status == PipelineStatus::Failed
    }

    /// Record a per-record error in both the error list and the metrics.
    pub fn add_error(&mut self, record: &str, message: &str) {
        self.collected_errors.push(StageError::Record {
            record: record.to_string(),
            message: message.to_string(),
        });
        self.metrics.errors.push(format!("{record}: {message}"));
        self.metrics.records_failed += 1;
    }

    pub fn add_warning(&mut self, warning: &str) {
        self.metrics.warnings.push(warning.to_string());
    }
}
