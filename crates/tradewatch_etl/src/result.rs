//! ETL result and live job-status types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Standardized result from an ETL run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EtlResult {
    pub records_processed: u64,
    pub records_inserted: u64,
    pub records_updated: u64,
    pub records_skipped: u64,
    pub records_failed: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl EtlResult {
    pub fn started_now() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => {
                Some((end - start).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        }
    }

    /// Fraction of processed records that did not fail, as a percentage.
    pub fn success_rate(&self) -> f64 {
        if self.records_processed == 0 {
            return 100.0;
        }
        let ok = self.records_processed - self.records_failed.min(self.records_processed);
        (ok as f64 / self.records_processed as f64) * 100.0
    }

    /// A run is successful when it collected no errors.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!(etl_error = %message);
        self.errors.push(message);
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(etl_warning = %message);
        self.warnings.push(message);
    }
}

/// Live progress entry for an in-flight ETL job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub status: String,
    pub progress: u64,
    pub total: Option<u64>,
    pub message: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<EtlResult>,
}

impl Default for JobProgress {
    fn default() -> Self {
        Self {
            status: "queued".to_string(),
            progress: 0,
            total: None,
            message: "Job queued".to_string(),
            started_at: None,
            completed_at: None,
            result: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        let mut result = EtlResult::default();
        assert!((result.success_rate() - 100.0).abs() < f64::EPSILON);

        result.records_processed = 10;
        result.records_failed = 2;
        assert!((result.success_rate() - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_is_success_tracks_errors_only() {
        let mut result = EtlResult::default();
        result.add_warning("slow source");
        assert!(result.is_success());

        result.add_error("source exploded");
        assert!(!result.is_success());
    }

    #[test]
    fn test_duration() {
        let mut result = EtlResult::started_now();
        assert_eq!(result.duration_seconds(), None);
        result.completed_at = result.started_at.map(|t| t + chrono::Duration::seconds(3));
        assert!((result.duration_seconds().unwrap() - 3.0).abs() < 0.001);
    }
}
