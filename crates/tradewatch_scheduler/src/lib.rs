//! Durable job scheduler.
//!
//! Job definitions persist in the scheduled_jobs table; the in-memory
//! scheduler is a cache rebuilt from it on startup. Guarantees:
//! at-most-one running instance per job, coalesced missed firings, and
//! missed-job recovery on process start. Each execution captures its own
//! log lines into the job_executions table.

pub mod capture;
pub mod history;
pub mod manager;
pub mod trigger;

pub use capture::{JobLogLayer, LogCaptureRegistry};
pub use history::JobHistory;
pub use manager::{JobInfo, JobRunner, Scheduler};
pub use trigger::Trigger;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid cron expression '{expression}': {message}")]
    InvalidCron { expression: String, message: String },

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job already exists: {0}")]
    AlreadyExists(String),

    #[error("No runner registered for function '{0}'")]
    UnknownFunction(String),

    #[error("Scheduler already started in this process")]
    AlreadyStarted,

    #[error("Database error: {0}")]
    Db(#[from] tradewatch_db::DbError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
