//! Blob store abstraction.
//!
//! The filesystem implementation keeps one directory per bucket under the
//! Tradewatch home. The trait seam exists so tests (and an object-store
//! deployment) can swap the backend without touching the manager.

use crate::{Result, StorageError};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Bucket-scoped blob operations. Writes overwrite existing paths
/// (upsert semantics); dedup happens above this layer via content hash.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, bucket: &str, path: &str, bytes: &[u8]) -> Result<()>;
    async fn get(&self, bucket: &str, path: &str) -> Result<Vec<u8>>;
    async fn exists(&self, bucket: &str, path: &str) -> Result<bool>;
}

/// Filesystem-backed blob store.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Store rooted at the default blobs directory (~/.tradewatch/blobs).
    pub fn default_root() -> Self {
        Self::new(tradewatch_logging::blobs_dir())
    }

    fn resolve(&self, bucket: &str, path: &str) -> PathBuf {
        let mut full = self.root.join(bucket);
        // Keep traversal components out of constructed paths.
        for component in Path::new(path).components() {
            if let Component::Normal(part) = component {
                full.push(part);
            }
        }
        full
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, bucket: &str, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(bucket, path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;
        debug!(bucket, path, size = bytes.len(), "Stored blob");
        Ok(())
    }

    async fn get(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(bucket, path);
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                path: path.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, bucket: &str, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.resolve(bucket, path)).await?)
    }
}
