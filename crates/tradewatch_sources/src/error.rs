//! Error taxonomy for source adapters.
//!
//! `Transient` failures are retried locally by the fetcher; exhausted
//! retries surface as `RetriesExhausted` and make the run partial.
//! `Blocked` reaches the orchestrator, which may fall back to a
//! browser-driver replay of the same flow or mark the run failed.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SourceError>;

#[derive(Debug, Error)]
pub enum SourceError {
    /// HTTP 429/503/502, timeouts, DNS failures. Recovered by retry.
    #[error("Transient network failure: {0}")]
    Transient(String),

    /// Retry budget spent without a successful response.
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// HTTP 404. Terminal for the requested resource, never retried.
    #[error("Not found: {0}")]
    NotFound(String),

    /// WAF 403, HTML where JSON was expected, or a redirect back to the
    /// agreement page. The Senate source raises this for Akamai blocks.
    #[error("Source blocked: {0}")]
    Blocked(String),

    /// Session establishment failed (missing CSRF or session cookie).
    #[error("Session error: {0}")]
    Session(String),

    /// Payload did not match the expected wire format.
    #[error("Malformed payload: {0}")]
    Parse(String),

    /// Raw archival failed; the adapter run is partial.
    #[error("Storage failure: {0}")]
    Storage(#[from] tradewatch_storage::StorageError),

    /// The annual index ZIP could not be read.
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl SourceError {
    /// True when the orchestrator should consider a browser-driver
    /// fallback instead of plain retry.
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_) | Self::Session(_))
    }
}
