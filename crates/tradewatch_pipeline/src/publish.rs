//! Publishing stage: idempotent upsert of politicians and disclosures.
//!
//! No run-wide transaction: each politician upsert is its own unit of
//! work, and disclosure writes commit per row (update mode) or per chunk
//! of 50 (insert-only mode, falling back to row-by-row on a duplicate),
//! so high-volume runs keep partial progress on failure. Duplicate-key
//! collisions downgrade to skips.

use crate::ingest::elapsed_seconds;
use crate::stage::PipelineStage;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info};

use tradewatch_protocol::{
    NormalizedDisclosure, PipelineContext, PipelineMetrics, PipelineResult, PipelineStatus,
    PublishStats, PublishedRecord,
};
use tradewatch_db::{DisclosureUpdate, NewDisclosure, Politician, TradewatchDb};

/// Batch size for the insert-only fast path.
const INSERT_BATCH_SIZE: usize = 50;

pub struct PublishingStage {
    db: TradewatchDb,
    pub skip_duplicates: bool,
    pub update_existing: bool,
    /// Chunk size for insert-only batches.
    pub batch_size: usize,
}

impl PublishingStage {
    pub fn new(db: TradewatchDb) -> Self {
        Self {
            db,
            skip_duplicates: true,
            update_existing: true,
            batch_size: INSERT_BATCH_SIZE,
        }
    }

    /// Insert-only mode: duplicates skip instead of updating, and writes
    /// go through the batched insert path.
    pub fn insert_only(mut self) -> Self {
        self.update_existing = false;
        self
    }

    /// Resolve the politician id: supplied, matched by name, or created.
    async fn ensure_politician(
        &self,
        disclosure: &NormalizedDisclosure,
        stats: &mut PublishStats,
    ) -> Option<String> {
        if let Some(id) = &disclosure.politician_id {
            stats.politicians_matched += 1;
            return Some(id.clone());
        }

        match self
            .db
            .find_politician_by_name(
                &disclosure.politician_first_name,
                &disclosure.politician_last_name,
                Some(&disclosure.politician_role),
            )
            .await
        {
            Ok(Some(existing)) => {
                stats.politicians_matched += 1;
                return Some(existing.id);
            }
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "Politician lookup failed");
                return None;
            }
        }

        let bioguide_id = disclosure
            .raw_data
            .get("bioguide_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let politician = Politician::new(
            &disclosure.politician_first_name,
            &disclosure.politician_last_name,
            &disclosure.politician_role,
        )
        .with_full_name(&disclosure.politician_full_name)
        .with_party(disclosure.politician_party.clone())
        .with_state(disclosure.politician_state.clone())
        .with_bioguide_id(bioguide_id)
        .with_source(&disclosure.source);

        match self.db.upsert_politician(&politician).await {
            Ok((id, created)) => {
                if created {
                    stats.politicians_created += 1;
                } else {
                    stats.politicians_matched += 1;
                }
                Some(id)
            }
            Err(e) => {
                error!(error = %e, politician = %disclosure.politician_full_name, "Politician creation failed");
                None
            }
        }
    }

    /// Insert-only publishing: resolve politicians record by record, then
    /// write in chunks of `batch_size`. The unique key downgrades
    /// collisions to skips inside the batch, so no per-record existence
    /// check is needed.
    async fn process_insert_only(
        &self,
        data: Vec<NormalizedDisclosure>,
        context: &PipelineContext,
    ) -> PipelineResult<PublishedRecord> {
        let started = Utc::now();
        let mut metrics = PipelineMetrics::default();
        let mut published: Vec<PublishedRecord> = Vec::new();
        let mut stats = PublishStats::default();

        metrics.records_input = data.len() as u64;
        info!(
            count = data.len(),
            batch_size = self.batch_size,
            source = %context.source_name,
            "Starting batched publishing"
        );

        // Resolve politicians first; rows that fail drop out here and
        // the rest keep their input order.
        let mut resolved: Vec<(String, NewDisclosure)> = Vec::with_capacity(data.len());
        for (index, disclosure) in data.iter().enumerate() {
            let Some(politician_id) = self.ensure_politician(disclosure, &mut stats).await else {
                metrics.records_failed += 1;
                metrics
                    .errors
                    .push(format!("Record {index}: politician creation/matching failed"));
                continue;
            };
            let new = Self::new_disclosure(disclosure, &politician_id);
            resolved.push((politician_id, new));
        }

        for chunk in resolved.chunks(self.batch_size.max(1)) {
            if context.is_cancelled() {
                metrics.errors.push("publishing cancelled".to_string());
                break;
            }

            let rows: Vec<NewDisclosure> = chunk.iter().map(|(_, new)| new.clone()).collect();
            let outcome = match self.db.insert_disclosures_batch(&rows).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    // Non-duplicate errors fail the whole chunk.
                    metrics.records_failed += chunk.len() as u64;
                    metrics.errors.push(format!("Batch insert failed: {e}"));
                    continue;
                }
            };

            for ((politician_id, _), row_id) in chunk.iter().zip(outcome.row_ids) {
                match row_id {
                    Some(disclosure_id) => {
                        metrics.records_output += 1;
                        stats.disclosures_inserted += 1;
                        published.push(PublishedRecord::Inserted {
                            disclosure_id,
                            politician_id: politician_id.clone(),
                        });
                    }
                    None => {
                        // Duplicates never fail; skip_duplicates only
                        // decides how loudly they are reported.
                        if self.skip_duplicates {
                            debug!("Duplicate key in batch, counting as skipped");
                        } else {
                            metrics.warnings.push(format!(
                                "duplicate disclosure for politician {politician_id} skipped"
                            ));
                        }
                        metrics.records_skipped += 1;
                        stats.disclosures_skipped += 1;
                        published.push(PublishedRecord::Skipped {
                            politician_id: politician_id.clone(),
                        });
                    }
                }
            }
        }

        metrics.duration_seconds = elapsed_seconds(started);
        self.finish_result(metrics, stats, published)
    }

    fn finish_result(
        &self,
        mut metrics: PipelineMetrics,
        stats: PublishStats,
        published: Vec<PublishedRecord>,
    ) -> PipelineResult<PublishedRecord> {
        let status = if metrics.records_output > 0 || metrics.records_skipped > 0 {
            if metrics.records_failed == 0 {
                PipelineStatus::Success
            } else {
                PipelineStatus::PartialSuccess
            }
        } else {
            metrics.errors.push("No records successfully published".to_string());
            PipelineStatus::Failed
        };

        info!(
            published = metrics.records_output,
            inserted = stats.disclosures_inserted,
            updated = stats.disclosures_updated,
            skipped = metrics.records_skipped,
            failed = metrics.records_failed,
            duration = metrics.duration_seconds,
            "Publishing complete"
        );

        let mut result = PipelineResult::new(self.name(), status, published, metrics);
        result.collected_errors.extend(
            result
                .metrics
                .errors
                .iter()
                .map(|message| tradewatch_protocol::StageError::Stage(message.clone()))
                .collect::<Vec<_>>(),
        );
        // Stage consumers read the counters out of the first element.
        result.data.insert(0, PublishedRecord::Summary(stats));
        result
    }

    fn new_disclosure(disclosure: &NormalizedDisclosure, politician_id: &str) -> NewDisclosure {
        NewDisclosure {
            politician_id: politician_id.to_string(),
            transaction_date: disclosure.transaction_date,
            disclosure_date: disclosure.disclosure_date,
            transaction_type: disclosure.transaction_type.clone(),
            asset_name: disclosure.asset_name.clone(),
            asset_ticker: disclosure.asset_ticker.clone(),
            asset_type: disclosure.asset_type.clone(),
            amount_range_min: disclosure.amount_range_min,
            amount_range_max: disclosure.amount_range_max,
            amount_exact: disclosure.amount_exact,
            source: Some(disclosure.source.clone()),
            source_url: disclosure.source_url.clone(),
            source_document_id: disclosure.source_document_id.clone(),
            raw_data: serde_json::Value::Object(disclosure.raw_data.clone()),
        }
    }
}

#[async_trait]
impl PipelineStage<NormalizedDisclosure, PublishedRecord> for PublishingStage {
    fn name(&self) -> &'static str {
        "publishing"
    }

    async fn process(
        &self,
        data: Vec<NormalizedDisclosure>,
        context: &PipelineContext,
    ) -> PipelineResult<PublishedRecord> {
        // High-volume insert-only runs take the batched path.
        if !self.update_existing {
            return self.process_insert_only(data, context).await;
        }

        let started = Utc::now();
        let mut metrics = PipelineMetrics::default();
        let mut published: Vec<PublishedRecord> = Vec::new();
        let mut stats = PublishStats::default();

        metrics.records_input = data.len() as u64;
        info!(count = data.len(), source = %context.source_name, "Starting publishing");

        for (index, disclosure) in data.iter().enumerate() {
            if context.is_cancelled() {
                metrics.errors.push("publishing cancelled".to_string());
                break;
            }

            let Some(politician_id) = self.ensure_politician(disclosure, &mut stats).await else {
                metrics.records_failed += 1;
                metrics
                    .errors
                    .push(format!("Record {index}: politician creation/matching failed"));
                continue;
            };

            let existing = match self
                .db
                .find_disclosure(
                    &politician_id,
                    disclosure.transaction_date,
                    &disclosure.asset_name,
                    &disclosure.transaction_type,
                )
                .await
            {
                Ok(existing) => existing,
                Err(e) => {
                    metrics.records_failed += 1;
                    metrics.errors.push(format!("Record {index}: lookup failed: {e}"));
                    continue;
                }
            };

            if let Some(existing) = existing {
                let update = DisclosureUpdate {
                    asset_ticker: disclosure.asset_ticker.clone(),
                    asset_type: disclosure.asset_type.clone(),
                    amount_range_min: disclosure.amount_range_min,
                    amount_range_max: disclosure.amount_range_max,
                    amount_exact: disclosure.amount_exact,
                    source_url: disclosure.source_url.clone(),
                    raw_data: serde_json::Value::Object(disclosure.raw_data.clone()),
                };
                match self.db.update_disclosure(&existing.id, &update).await {
                    Ok(true) => {
                        metrics.records_output += 1;
                        stats.disclosures_updated += 1;
                        published.push(PublishedRecord::Updated {
                            disclosure_id: existing.id.clone(),
                            politician_id: politician_id.clone(),
                        });
                    }
                    Ok(false) => {
                        metrics.records_failed += 1;
                        metrics.errors.push(format!("Record {index}: update failed"));
                    }
                    Err(e) => {
                        metrics.records_failed += 1;
                        metrics.errors.push(format!("Record {index}: {e}"));
                    }
                }
                continue;
            }

            match self
                .db
                .insert_disclosure(&Self::new_disclosure(disclosure, &politician_id))
                .await
            {
                Ok(disclosure_id) => {
                    metrics.records_output += 1;
                    stats.disclosures_inserted += 1;
                    published.push(PublishedRecord::Inserted {
                        disclosure_id,
                        politician_id: politician_id.clone(),
                    });
                }
                Err(e) if e.is_unique_violation() => {
                    // A concurrent writer got there first; not an error.
                    debug!(record = index, "Duplicate key on insert, counting as skipped");
                    metrics.records_skipped += 1;
                    stats.disclosures_skipped += 1;
                    published.push(PublishedRecord::Skipped {
                        politician_id: politician_id.clone(),
                    });
                }
                Err(e) => {
                    metrics.records_failed += 1;
                    metrics.errors.push(format!("Record {index}: insert failed: {e}"));
                }
            }
        }

        metrics.duration_seconds = elapsed_seconds(started);
        self.finish_result(metrics, stats, published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tradewatch_protocol::RawRecord;

    fn normalized(name: &str, asset: &str) -> NormalizedDisclosure {
        let (first, last) = match name.split_once(' ') {
            Some((f, l)) => (f.to_string(), l.to_string()),
            None => (name.to_string(), String::new()),
        };
        NormalizedDisclosure {
            politician_id: None,
            politician_first_name: first,
            politician_last_name: last,
            politician_full_name: name.to_string(),
            politician_role: "Representative".to_string(),
            politician_party: None,
            politician_state: Some("CA".to_string()),
            transaction_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            disclosure_date: NaiveDate::from_ymd_opt(2024, 1, 20).unwrap(),
            transaction_type: "purchase".to_string(),
            asset_name: asset.to_string(),
            asset_ticker: Some("AAPL".to_string()),
            asset_type: Some("stock".to_string()),
            amount_range_min: Some(1001.0),
            amount_range_max: Some(15000.0),
            amount_exact: None,
            source: "quiverquant".to_string(),
            source_url: None,
            source_document_id: None,
            raw_data: RawRecord::new(),
            processed_at: Utc::now(),
        }
    }

    fn ctx() -> PipelineContext {
        PipelineContext::new("QuiverQuant", "quiverquant")
    }

    fn stats_of(result: &PipelineResult<PublishedRecord>) -> PublishStats {
        match &result.data[0] {
            PublishedRecord::Summary(stats) => stats.clone(),
            other => panic!("expected summary first, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_insert_creates_politician_and_disclosure() {
        let db = TradewatchDb::in_memory().await.unwrap();
        let stage = PublishingStage::new(db.clone());

        let result = stage
            .process(vec![normalized("Nancy Pelosi", "Apple Inc")], &ctx())
            .await;

        assert_eq!(result.status, PipelineStatus::Success);
        let stats = stats_of(&result);
        assert_eq!(stats.politicians_created, 1);
        assert_eq!(stats.disclosures_inserted, 1);
        assert_eq!(db.count_disclosures().await.unwrap(), 1);

        let politician = db
            .find_politician_by_name("Nancy", "Pelosi", Some("Representative"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(politician.state_or_country.as_deref(), Some("CA"));
    }

    #[tokio::test]
    async fn test_duplicate_skip_semantics() {
        let db = TradewatchDb::in_memory().await.unwrap();
        let stage = PublishingStage::new(db.clone()).insert_only();

        let first = stage
            .process(vec![normalized("Nancy Pelosi", "Apple Inc")], &ctx())
            .await;
        assert_eq!(stats_of(&first).disclosures_inserted, 1);

        let second = stage
            .process(vec![normalized("Nancy Pelosi", "Apple Inc")], &ctx())
            .await;
        let stats = stats_of(&second);
        assert_eq!(stats.disclosures_inserted, 0);
        assert_eq!(stats.disclosures_updated, 0);
        assert_eq!(stats.disclosures_skipped, 1);
        assert_eq!(second.status, PipelineStatus::Success);
        assert_eq!(db.count_disclosures().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_only_batches_keep_order_across_chunks() {
        let db = TradewatchDb::in_memory().await.unwrap();
        let mut stage = PublishingStage::new(db.clone()).insert_only();
        stage.batch_size = 2;

        // Seed a row the first chunk will collide with.
        stage
            .process(vec![normalized("Nancy Pelosi", "Asset One")], &ctx())
            .await;

        let result = stage
            .process(
                vec![
                    normalized("Nancy Pelosi", "Asset One"),
                    normalized("Nancy Pelosi", "Asset Two"),
                    normalized("Nancy Pelosi", "Asset Three"),
                ],
                &ctx(),
            )
            .await;

        let stats = stats_of(&result);
        assert_eq!(stats.disclosures_inserted, 2);
        assert_eq!(stats.disclosures_skipped, 1);
        assert_eq!(result.status, PipelineStatus::Success);

        // Per-record outcomes keep input order across chunk boundaries:
        // the collision first, then the two fresh inserts.
        assert!(matches!(result.data[1], PublishedRecord::Skipped { .. }));
        assert!(matches!(result.data[2], PublishedRecord::Inserted { .. }));
        assert!(matches!(result.data[3], PublishedRecord::Inserted { .. }));
        assert_eq!(db.count_disclosures().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_update_existing_rewrites_mutable_fields() {
        let db = TradewatchDb::in_memory().await.unwrap();
        let stage = PublishingStage::new(db.clone());

        stage
            .process(vec![normalized("Nancy Pelosi", "Apple Inc")], &ctx())
            .await;

        let mut updated = normalized("Nancy Pelosi", "Apple Inc");
        updated.amount_range_min = Some(15001.0);
        updated.amount_range_max = Some(50000.0);
        let result = stage.process(vec![updated], &ctx()).await;

        let stats = stats_of(&result);
        assert_eq!(stats.disclosures_updated, 1);
        assert_eq!(stats.disclosures_inserted, 0);
        assert_eq!(db.count_disclosures().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_publish_twice_is_idempotent() {
        let db = TradewatchDb::in_memory().await.unwrap();
        let stage = PublishingStage::new(db.clone());

        stage
            .process(vec![normalized("Nancy Pelosi", "Apple Inc")], &ctx())
            .await;
        let count_after_first = db.count_disclosures().await.unwrap();

        stage
            .process(vec![normalized("Nancy Pelosi", "Apple Inc")], &ctx())
            .await;
        assert_eq!(db.count_disclosures().await.unwrap(), count_after_first);
    }

    #[tokio::test]
    async fn test_order_preserved_in_published_records() {
        let db = TradewatchDb::in_memory().await.unwrap();
        let stage = PublishingStage::new(db.clone());

        let result = stage
            .process(
                vec![
                    normalized("Nancy Pelosi", "Asset One"),
                    normalized("Nancy Pelosi", "Asset Two"),
                    normalized("Nancy Pelosi", "Asset Three"),
                ],
                &ctx(),
            )
            .await;

        // First element is the summary; the rest keep source order.
        let ids: Vec<&str> = result.data[1..]
            .iter()
            .map(|record| match record {
                PublishedRecord::Inserted { disclosure_id, .. } => disclosure_id.as_str(),
                other => panic!("unexpected record {other:?}"),
            })
            .collect();
        assert_eq!(ids.len(), 3);

        let assets = ["Asset One", "Asset Two", "Asset Three"];
        for (id, asset) in ids.iter().zip(assets) {
            let row = db
                .find_disclosure(
                    match &result.data[1] {
                        PublishedRecord::Inserted { politician_id, .. } => politician_id,
                        _ => unreachable!(),
                    },
                    NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
                    asset,
                    "purchase",
                )
                .await
                .unwrap()
                .unwrap();
            assert_eq!(&row.id, id);
        }
    }
}
