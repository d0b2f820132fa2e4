//! UK Parliament adapter.
//!
//! Reads the Members API: a paged member search, then each member's
//! registered financial interests. Only shareholding-class interests
//! become records; the register does not carry per-trade detail.

use crate::error::{Result, SourceError};
use crate::http::HttpFetcher;
use crate::source::{record_from_pairs, DisclosureSource};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use tradewatch_protocol::{RawRecord, SourceConfig};
use tradewatch_storage::StorageManager;

/// Members API page size.
const PAGE_SIZE: u64 = 20;
/// Interest categories worth ingesting, matched on the category name.
const INTEREST_KEYWORDS: &[&str] = &["shareholding", "security", "financial interest"];

pub struct UkParliamentSource {
    config: SourceConfig,
    storage: Option<StorageManager>,
}

impl UkParliamentSource {
    pub fn new() -> Self {
        Self {
            config: default_config(),
            storage: None,
        }
    }

    fn members_url(&self, skip: u64) -> String {
        format!(
            "{}/api/Members/Search?House=Commons&IsCurrentMember=true&skip={}&take={}",
            self.config.base_url, skip, PAGE_SIZE
        )
    }

    fn interests_url(&self, member_id: i64) -> String {
        format!(
            "{}/api/Members/{}/RegisteredInterests",
            self.config.base_url, member_id
        )
    }

    async fn fetch_members(&self, fetcher: &HttpFetcher, max_members: usize) -> Result<Vec<(i64, String)>> {
        let mut members = Vec::new();
        let mut skip = 0u64;

        loop {
            let payload = fetcher.get_json(&self.members_url(skip)).await?;
            let items = payload
                .get("items")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            if items.is_empty() {
                break;
            }

            for item in &items {
                let value = item.get("value").unwrap_or(item);
                let Some(id) = value.get("id").and_then(|v| v.as_i64()) else {
                    continue;
                };
                let name = value
                    .get("nameDisplayAs")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                if !name.is_empty() {
                    members.push((id, name));
                }
            }

            if members.len() >= max_members {
                members.truncate(max_members);
                break;
            }

            let total = payload
                .get("totalResults")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            skip += PAGE_SIZE;
            if skip >= total {
                break;
            }
        }

        info!(count = members.len(), "Fetched Commons members");
        Ok(members)
    }

    async fn fetch_member_interests(
        &self,
        fetcher: &HttpFetcher,
        member_id: i64,
        member_name: &str,
    ) -> Result<Vec<RawRecord>> {
        let url = self.interests_url(member_id);
        let payload = match fetcher.get_json(&url).await {
            Ok(payload) => payload,
            Err(SourceError::NotFound(_)) => {
                debug!(member = member_name, "No registered interests");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        if let Some(storage) = &self.storage {
            if let Err(e) = storage
                .save_api_response(&payload, "uk_parliament", "/RegisteredInterests", Some(&url))
                .await
            {
                warn!(error = %e, "Failed to archive UK interests payload");
            }
        }

        let categories = payload
            .get("value")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut records = Vec::new();
        for category in &categories {
            let category_name = category
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_lowercase();
            if !INTEREST_KEYWORDS.iter().any(|k| category_name.contains(k)) {
                continue;
            }

            let interests = category
                .get("interests")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();

            for interest in &interests {
                let description = interest
                    .get("interest")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .trim()
                    .to_string();
                if description.is_empty() {
                    continue;
                }

                let registered = interest
                    .get("createdWhen")
                    .or_else(|| interest.get("registeredLate"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                let date = if registered.is_empty() {
                    Utc::now().date_naive().to_string()
                } else {
                    registered
                };

                records.push(record_from_pairs(vec![
                    ("politician_name", json!(member_name)),
                    ("transaction_date", json!(date)),
                    ("disclosure_date", json!(date)),
                    ("asset_name", json!(description)),
                    ("transaction_type", json!("purchase")),
                    ("interest_category", json!(category_name)),
                    ("source_url", json!(url)),
                    ("chamber", json!("Commons")),
                ]));
            }
        }

        Ok(records)
    }
}

impl Default for UkParliamentSource {
    fn default() -> Self {
        Self::new()
    }
}

fn default_config() -> SourceConfig {
    SourceConfig::new("UK Parliament", "uk_parliament", "https://members-api.parliament.uk")
        .with_request_delay(1.0)
        .with_max_retries(3)
        .with_timeout(30)
        .with_header("User-Agent", "Mozilla/5.0 (compatible; TradewatchBot/1.0)")
}

#[async_trait]
impl DisclosureSource for UkParliamentSource {
    fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn configure(&mut self, overrides: &BTreeMap<String, serde_json::Value>) {
        self.config.apply(overrides);
    }

    fn attach_storage(&mut self, storage: StorageManager) {
        self.storage = Some(storage);
    }

    async fn fetch(
        &self,
        _lookback_days: u32,
        params: &BTreeMap<String, serde_json::Value>,
    ) -> Result<Vec<RawRecord>> {
        let max_members = params
            .get("max_members")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(40);

        let fetcher = HttpFetcher::new(&self.config)?;
        let members = self.fetch_members(&fetcher, max_members).await?;

        let mut records = Vec::new();
        for (member_id, member_name) in &members {
            match self
                .fetch_member_interests(&fetcher, *member_id, member_name)
                .await
            {
                Ok(interests) => records.extend(interests),
                Err(e) => warn!(error = %e, member = %member_name, "Failed to fetch interests"),
            }
        }

        info!(count = records.len(), "Collected UK Parliament interests");
        Ok(records)
    }
}
