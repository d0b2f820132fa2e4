//! Politician matching against existing database rows.

use std::collections::HashMap;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use tradewatch_db::{Politician, TradewatchDb};

/// Result of a match attempt. When `politician_id` is None the publisher
/// creates the politician with the inferred role.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub politician_id: Option<String>,
    pub role: String,
    pub party: Option<String>,
    pub state: Option<String>,
}

/// Caches the full politician table keyed by `lower(first)_lower(last)`.
///
/// The cache is populated once per orchestrator run and read-only
/// thereafter, so concurrent lookups are safe.
pub struct PoliticianMatcher {
    db: Option<TradewatchDb>,
    cache: OnceCell<HashMap<String, Politician>>,
}

impl PoliticianMatcher {
    pub fn new(db: Option<TradewatchDb>) -> Self {
        Self {
            db,
            cache: OnceCell::new(),
        }
    }

    async fn cache(&self) -> &HashMap<String, Politician> {
        self.cache
            .get_or_init(|| async {
                let mut map = HashMap::new();
                if let Some(db) = &self.db {
                    match db.list_politicians().await {
                        Ok(politicians) => {
                            for politician in politicians {
                                let key = cache_key(&politician.first_name, &politician.last_name);
                                map.insert(key, politician);
                            }
                            info!(count = map.len(), "Loaded politicians into matcher cache");
                        }
                        Err(e) => warn!(error = %e, "Failed to load politicians for matching"),
                    }
                }
                map
            })
            .await
    }

    /// Match by exact name key, then a single fuzzy pass on the last
    /// name, else fall back to a role inferred from the source.
    pub async fn match_politician(&self, first: &str, last: &str, source: &str) -> MatchOutcome {
        let cache = self.cache().await;

        if let Some(politician) = cache.get(&cache_key(first, last)) {
            debug!(first, last, "Exact matcher hit");
            return outcome_from(politician, source);
        }

        if !last.is_empty() {
            let needle = last.to_lowercase();
            if let Some(politician) = cache
                .iter()
                .find(|(key, _)| key.contains(&needle))
                .map(|(_, p)| p)
            {
                debug!(first, last, matched = %politician.full_name, "Fuzzy matcher hit");
                return outcome_from(politician, source);
            }
        }

        debug!(first, last, "No politician match");
        MatchOutcome {
            politician_id: None,
            role: infer_role_from_source(source),
            party: None,
            state: None,
        }
    }
}

fn cache_key(first: &str, last: &str) -> String {
    format!("{}_{}", first.to_lowercase(), last.to_lowercase())
}

fn outcome_from(politician: &Politician, source: &str) -> MatchOutcome {
    let role = if politician.role.trim().is_empty() {
        infer_role_from_source(source)
    } else {
        politician.role.clone()
    };
    MatchOutcome {
        politician_id: Some(politician.id.clone()),
        role,
        party: politician.party.clone(),
        state: politician.state_or_country.clone(),
    }
}

/// Infer a role from the source identifier when no database row exists.
pub fn infer_role_from_source(source: &str) -> String {
    let lower = source.to_lowercase();

    if lower.contains("house") || lower.contains("representative") {
        "Representative".to_string()
    } else if lower.contains("senate") || lower.contains("senator") {
        "Senator".to_string()
    } else if lower.contains("eu") || lower.contains("european") {
        "MEP".to_string()
    } else if lower.contains("uk") || lower.contains("parliament") {
        if lower.contains("lords") {
            "UK_LORD".to_string()
        } else {
            "UK_MP".to_string()
        }
    } else if lower.contains("california") {
        "CA_STATE_LEGISLATOR".to_string()
    } else if lower.contains("new york") || lower.contains("new_york") || lower.contains("ny") {
        "NY_STATE_LEGISLATOR".to_string()
    } else if lower.contains("texas") || lower.contains("tx") {
        "TX_STATE_LEGISLATOR".to_string()
    } else {
        "UNKNOWN".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exact_match_reuses_row() {
        let db = TradewatchDb::in_memory().await.unwrap();
        let politician = Politician::new("Nancy", "Pelosi", "Representative")
            .with_party(Some("D".to_string()))
            .with_state(Some("CA".to_string()));
        let id = db.insert_politician(&politician).await.unwrap();

        let matcher = PoliticianMatcher::new(Some(db));
        let outcome = matcher.match_politician("Nancy", "Pelosi", "us_house").await;

        assert_eq!(outcome.politician_id, Some(id));
        assert_eq!(outcome.role, "Representative");
        assert_eq!(outcome.party.as_deref(), Some("D"));
        assert_eq!(outcome.state.as_deref(), Some("CA"));
    }

    #[tokio::test]
    async fn test_fuzzy_match_on_last_name() {
        let db = TradewatchDb::in_memory().await.unwrap();
        let politician = Politician::new("Nancy", "Pelosi", "Representative");
        let id = db.insert_politician(&politician).await.unwrap();

        let matcher = PoliticianMatcher::new(Some(db));
        // Different first name still lands on the Pelosi row.
        let outcome = matcher.match_politician("N.", "Pelosi", "us_house").await;
        assert_eq!(outcome.politician_id, Some(id));
    }

    #[tokio::test]
    async fn test_miss_infers_role() {
        let matcher = PoliticianMatcher::new(None);
        let outcome = matcher.match_politician("Jane", "Doe", "us_senate").await;
        assert_eq!(outcome.politician_id, None);
        assert_eq!(outcome.role, "Senator");

        let outcome = matcher.match_politician("Jane", "Doe", "us_house").await;
        assert_eq!(outcome.role, "Representative");

        let outcome = matcher.match_politician("Jane", "Doe", "eu_parliament").await;
        assert_eq!(outcome.role, "MEP");

        let outcome = matcher.match_politician("Jane", "Doe", "somewhere").await;
        assert_eq!(outcome.role, "UNKNOWN");
    }
}
