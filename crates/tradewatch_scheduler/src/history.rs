//! In-memory execution history, seeded from the database.

use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::warn;

use tradewatch_db::{JobExecution, TradewatchDb};

/// How many executions the cache keeps.
const MAX_HISTORY: usize = 100;

/// Most-recent-first execution cache. The database holds the full
/// history; this exists so status queries don't round-trip.
pub struct JobHistory {
    executions: Mutex<VecDeque<JobExecution>>,
}

impl JobHistory {
    pub fn new() -> Self {
        Self {
            executions: Mutex::new(VecDeque::new()),
        }
    }

    /// Seed the cache with the last executions from the database.
    pub async fn load(db: &TradewatchDb) -> Self {
        let history = Self::new();
        match db.recent_executions(MAX_HISTORY as i64).await {
            Ok(executions) => {
                if let Ok(mut cache) = history.executions.lock() {
                    cache.extend(executions);
                }
            }
            Err(e) => warn!(error = %e, "Failed to load job history from database"),
        }
        history
    }

    /// Record a finished execution, newest first.
    pub fn record(&self, execution: JobExecution) {
        if let Ok(mut cache) = self.executions.lock() {
            cache.push_front(execution);
            cache.truncate(MAX_HISTORY);
        }
    }

    /// Recent executions, optionally filtered by job id.
    pub fn recent(&self, job_id: Option<&str>, limit: usize) -> Vec<JobExecution> {
        let Ok(cache) = self.executions.lock() else {
            return Vec::new();
        };
        cache
            .iter()
            .filter(|execution| job_id.map_or(true, |id| execution.job_id == id))
            .take(limit)
            .cloned()
            .collect()
    }

    /// The most recent execution for a job.
    pub fn last_execution(&self, job_id: &str) -> Option<JobExecution> {
        self.recent(Some(job_id), 1).into_iter().next()
    }
}

impl Default for JobHistory {
    fn default() -> Self {
        Self::new()
    }
}
