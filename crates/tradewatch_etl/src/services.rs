//! Concrete ETL services built on the source adapters.

use crate::service::{EtlService, JobStatusStore};
use async_trait::async_trait;
use serde_json::json;

use tradewatch_protocol::types::raw_str;
use tradewatch_protocol::{RawRecord, TransactionType};
use tradewatch_db::TradewatchDb;
use tradewatch_sources::quiverquant::QuiverQuantSource;
use tradewatch_sources::us_senate::UsSenateSource;
use tradewatch_sources::DisclosureSource;

/// QuiverQuant ETL: the aggregator's API rows map almost one-to-one onto
/// the standardized record shape.
pub struct QuiverQuantEtl {
    db: TradewatchDb,
    status: JobStatusStore,
    lookback_days: u32,
}

impl QuiverQuantEtl {
    pub fn new(db: TradewatchDb) -> Self {
        Self {
            db,
            status: JobStatusStore::new(),
            lookback_days: 30,
        }
    }
}

#[async_trait]
impl EtlService for QuiverQuantEtl {
    fn source_id(&self) -> &'static str {
        "quiverquant"
    }

    fn source_name(&self) -> &'static str {
        "QuiverQuant"
    }

    fn status_store(&self) -> &JobStatusStore {
        &self.status
    }

    fn db(&self) -> &TradewatchDb {
        &self.db
    }

    async fn fetch_disclosures(
        &self,
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Vec<RawRecord>, String> {
        let mut source = QuiverQuantSource::new();
        let overrides: std::collections::BTreeMap<String, serde_json::Value> =
            params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        source.configure(&overrides);
        source
            .fetch(self.lookback_days, &overrides)
            .await
            .map_err(|e| e.to_string())
    }

    async fn parse_disclosure(&self, raw: &RawRecord) -> Option<RawRecord> {
        let mut parsed = raw.clone();

        // Chamber decides the role for rows the matcher has never seen.
        let role = match raw_str(raw, "chamber").as_deref() {
            Some("Senate") => "Senator",
            Some(_) => "Representative",
            None => "UNKNOWN",
        };
        parsed.insert("role".to_string(), json!(role));

        if let Some(kind) = raw_str(raw, "transaction_type") {
            parsed.insert(
                "transaction_type".to_string(),
                json!(TransactionType::normalize(&kind)),
            );
        }

        Some(parsed)
    }
}

/// Senate ETL: PTR search rows through the EFD session client.
pub struct SenateEtl {
    db: TradewatchDb,
    status: JobStatusStore,
    lookback_days: u32,
}

impl SenateEtl {
    pub fn new(db: TradewatchDb) -> Self {
        Self {
            db,
            status: JobStatusStore::new(),
            lookback_days: 30,
        }
    }
}

#[async_trait]
impl EtlService for SenateEtl {
    fn source_id(&self) -> &'static str {
        "us_senate"
    }

    fn source_name(&self) -> &'static str {
        "US Senate EFD"
    }

    fn status_store(&self) -> &JobStatusStore {
        &self.status
    }

    fn db(&self) -> &TradewatchDb {
        &self.db
    }

    async fn fetch_disclosures(
        &self,
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Vec<RawRecord>, String> {
        let mut source = UsSenateSource::new();
        let overrides: std::collections::BTreeMap<String, serde_json::Value> =
            params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        source.configure(&overrides);
        source
            .fetch(self.lookback_days, &overrides)
            .await
            .map_err(|e| e.to_string())
    }

    async fn parse_disclosure(&self, raw: &RawRecord) -> Option<RawRecord> {
        let mut parsed = raw.clone();
        parsed.insert("role".to_string(), json!("Senator"));

        if let Some(kind) = raw_str(raw, "transaction_type") {
            parsed.insert(
                "transaction_type".to_string(),
                json!(TransactionType::normalize(&kind)),
            );
        }

        Some(parsed)
    }

    /// PTR metadata rows always carry a report title as the asset name;
    /// require a politician too.
    async fn validate_disclosure(&self, parsed: &RawRecord) -> bool {
        raw_str(parsed, "asset_name").is_some() && raw_str(parsed, "politician_name").is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_quiver_parse_sets_role_from_chamber() {
        let db = TradewatchDb::in_memory().await.unwrap();
        let etl = QuiverQuantEtl::new(db);

        let raw: RawRecord = json!({
            "politician_name": "Nancy Pelosi",
            "chamber": "House",
            "transaction_type": "Buy"
        })
        .as_object()
        .unwrap()
        .clone();

        let parsed = etl.parse_disclosure(&raw).await.unwrap();
        assert_eq!(parsed["role"], json!("Representative"));
        assert_eq!(parsed["transaction_type"], json!("purchase"));
    }

    #[tokio::test]
    async fn test_senate_validation_needs_politician() {
        let db = TradewatchDb::in_memory().await.unwrap();
        let etl = SenateEtl::new(db);

        let with_name: RawRecord = json!({
            "politician_name": "Jon Tester",
            "asset_name": "Periodic Transaction Report"
        })
        .as_object()
        .unwrap()
        .clone();
        assert!(etl.validate_disclosure(&with_name).await);

        let without: RawRecord = json!({"asset_name": "Report"})
            .as_object()
            .unwrap()
            .clone();
        assert!(!etl.validate_disclosure(&without).await);
    }
}
