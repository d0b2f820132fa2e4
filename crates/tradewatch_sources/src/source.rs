//! The source adapter contract.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

use tradewatch_protocol::{RawRecord, SourceConfig};
use tradewatch_storage::StorageManager;

/// A disclosure source adapter.
///
/// Output contract: each yielded record carries at minimum
/// `politician_name`, `transaction_date`, `disclosure_date`, `asset_name`,
/// and `transaction_type`. Optional fields may be omitted but never
/// fabricated. When a storage manager is attached, the adapter archives
/// the raw payload it fetched before returning.
#[async_trait]
pub trait DisclosureSource: Send + Sync {
    fn config(&self) -> &SourceConfig;

    /// Merge pipeline-config overrides into this adapter's config.
    fn configure(&mut self, overrides: &BTreeMap<String, serde_json::Value>);

    /// Attach a storage manager for raw-payload archival.
    fn attach_storage(&mut self, storage: StorageManager);

    /// Fetch raw disclosure records.
    async fn fetch(
        &self,
        lookback_days: u32,
        params: &BTreeMap<String, serde_json::Value>,
    ) -> Result<Vec<RawRecord>>;

    /// Fetch one page of records for batch ingestion.
    ///
    /// Default: sources without pagination return everything at offset 0
    /// and nothing afterwards.
    async fn fetch_batch(
        &self,
        offset: u64,
        _limit: u64,
        lookback_days: u32,
        params: &BTreeMap<String, serde_json::Value>,
    ) -> Result<Vec<RawRecord>> {
        if offset > 0 {
            return Ok(Vec::new());
        }
        self.fetch(lookback_days, params).await
    }
}

/// Build a raw record from field pairs, dropping empty values.
pub(crate) fn record_from_pairs(pairs: Vec<(&str, serde_json::Value)>) -> RawRecord {
    let mut record = RawRecord::new();
    for (key, value) in pairs {
        let skip = match &value {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.trim().is_empty(),
            _ => false,
        };
        if !skip {
            record.insert(key.to_string(), value);
        }
    }
    record
}
