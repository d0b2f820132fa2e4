//! Registry of ETL services by source id.

use crate::service::EtlService;
use crate::EtlError;
use std::collections::HashMap;
use std::sync::Arc;

/// Tracks available ETL services. Duplicate registration is an error:
/// two services claiming one source id is always a wiring bug.
#[derive(Default)]
pub struct EtlRegistry {
    services: HashMap<String, Arc<dyn EtlService>>,
}

impl EtlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, service: Arc<dyn EtlService>) -> Result<(), EtlError> {
        let source_id = service.source_id().to_string();
        if self.services.contains_key(&source_id) {
            return Err(EtlError::DuplicateRegistration(source_id));
        }
        self.services.insert(source_id, service);
        Ok(())
    }

    pub fn get(&self, source_id: &str) -> Result<Arc<dyn EtlService>, EtlError> {
        self.services
            .get(source_id)
            .cloned()
            .ok_or_else(|| EtlError::UnknownSource(source_id.to_string()))
    }

    pub fn source_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.services.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::EtlResult;
    use crate::service::JobStatusStore;
    use async_trait::async_trait;
    use tradewatch_db::TradewatchDb;
    use tradewatch_protocol::RawRecord;

    struct StubService {
        db: TradewatchDb,
        status: JobStatusStore,
    }

    #[async_trait]
    impl EtlService for StubService {
        fn source_id(&self) -> &'static str {
            "stub"
        }
        fn source_name(&self) -> &'static str {
            "Stub"
        }
        fn status_store(&self) -> &JobStatusStore {
            &self.status
        }
        fn db(&self) -> &TradewatchDb {
            &self.db
        }
        async fn fetch_disclosures(
            &self,
            _params: &serde_json::Map<String, serde_json::Value>,
        ) -> Result<Vec<RawRecord>, String> {
            Ok(Vec::new())
        }
        async fn parse_disclosure(&self, raw: &RawRecord) -> Option<RawRecord> {
            Some(raw.clone())
        }
        async fn on_complete(&self, _job_id: &str, _result: &EtlResult) {}
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_an_error() {
        let db = TradewatchDb::in_memory().await.unwrap();
        let mut registry = EtlRegistry::new();

        registry
            .register(Arc::new(StubService {
                db: db.clone(),
                status: JobStatusStore::new(),
            }))
            .unwrap();

        let err = registry
            .register(Arc::new(StubService {
                db,
                status: JobStatusStore::new(),
            }))
            .unwrap_err();
        assert!(matches!(err, EtlError::DuplicateRegistration(_)));
    }

    #[tokio::test]
    async fn test_lookup() {
        let db = TradewatchDb::in_memory().await.unwrap();
        let mut registry = EtlRegistry::new();
        registry
            .register(Arc::new(StubService {
                db,
                status: JobStatusStore::new(),
            }))
            .unwrap();

        assert!(registry.get("stub").is_ok());
        assert!(matches!(
            registry.get("nope"),
            Err(EtlError::UnknownSource(_))
        ));
        assert_eq!(registry.source_ids(), vec!["stub"]);
    }
}
