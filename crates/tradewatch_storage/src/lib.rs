//! Raw-artifact storage for Tradewatch.
//!
//! Blobs live in logical buckets (`raw-pdfs`, `api-responses`,
//! `parsed-data`); metadata rows live in the `stored_files` table.
//! Content is deduplicated by SHA-256 within a bucket: re-uploading the
//! same bytes reuses the existing row and blob.

pub mod manager;
pub mod store;

pub use manager::{StorageManager, BUCKET_API_RESPONSES, BUCKET_PARSED_DATA, BUCKET_RAW_PDFS};
pub use store::{BlobStore, FsBlobStore};

use thiserror::Error;

/// Storage layer errors. Upload failures propagate to the caller; the
/// adapter run that triggered them becomes partial.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Blob store error: {0}")]
    Blob(#[from] std::io::Error),

    #[error("Metadata error: {0}")]
    Metadata(#[from] tradewatch_db::DbError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Blob not found: {bucket}/{path}")]
    NotFound { bucket: String, path: String },
}

pub type Result<T> = std::result::Result<T, StorageError>;
