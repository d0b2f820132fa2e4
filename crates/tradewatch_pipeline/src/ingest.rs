//! Ingestion stages: pull raw records out of a source adapter.

use crate::stage::PipelineStage;
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::{info, warn};

use tradewatch_protocol::{
    PipelineContext, PipelineMetrics, PipelineResult, PipelineStatus, RawDisclosure, StageError,
};
use tradewatch_sources::{create_source, SourceKind};
use tradewatch_storage::StorageManager;

/// Thin stage: resolve the adapter, fetch, wrap into `RawDisclosure`.
pub struct IngestionStage {
    pub lookback_days: u32,
    pub enable_storage: bool,
    storage: Option<StorageManager>,
}

impl IngestionStage {
    pub fn new(lookback_days: u32) -> Self {
        Self {
            lookback_days,
            enable_storage: true,
            storage: None,
        }
    }

    pub fn with_storage(mut self, storage: Option<StorageManager>) -> Self {
        self.storage = storage;
        self
    }

    fn build_source(
        &self,
        context: &PipelineContext,
    ) -> Result<Box<dyn tradewatch_sources::DisclosureSource>, String> {
        let kind = SourceKind::parse(&context.source_type)
            .ok_or_else(|| format!("Unknown source type: {}", context.source_type))?;

        let mut source = create_source(kind);
        source.configure(&context.config);

        if self.enable_storage {
            if let Some(storage) = &self.storage {
                source.attach_storage(storage.clone());
                info!("Storage manager attached to source for raw data archival");
            }
        }

        Ok(source)
    }
}

#[async_trait]
impl PipelineStage<RawDisclosure, RawDisclosure> for IngestionStage {
    fn name(&self) -> &'static str {
        "ingestion"
    }

    async fn process(
        &self,
        _data: Vec<RawDisclosure>,
        context: &PipelineContext,
    ) -> PipelineResult<RawDisclosure> {
        let started = Utc::now();
        let mut metrics = PipelineMetrics::default();

        info!(
            source = %context.source_name,
            source_type = %context.source_type,
            lookback_days = self.lookback_days,
            "Starting ingestion"
        );

        let source = match self.build_source(context) {
            Ok(source) => source,
            Err(message) => {
                metrics.errors.push(message.clone());
                let mut result =
                    PipelineResult::new(self.name(), PipelineStatus::Failed, Vec::new(), metrics);
                result.collected_errors.push(StageError::Stage(message));
                return result;
            }
        };

        let raw_items = match source.fetch(self.lookback_days, &context.config).await {
            Ok(items) => items,
            Err(e) => {
                let message = format!("Ingestion error: {e}");
                metrics.errors.push(message.clone());
                metrics.duration_seconds = elapsed_seconds(started);
                let mut result =
                    PipelineResult::new(self.name(), PipelineStatus::Failed, Vec::new(), metrics);
                result.collected_errors.push(if e.is_blocked() {
                    StageError::Stage(format!("blocked: {e}"))
                } else {
                    StageError::Stage(message)
                });
                return result;
            }
        };

        metrics.records_input = raw_items.len() as u64;
        info!(count = raw_items.len(), "Fetched raw records");

        let mut disclosures = Vec::with_capacity(raw_items.len());
        for item in raw_items {
            disclosures.push(RawDisclosure::new(
                &context.source_name,
                &context.source_type,
                item,
            ));
            metrics.records_output += 1;
        }

        metrics.duration_seconds = elapsed_seconds(started);
        let status = PipelineStatus::from_counts(
            metrics.records_output,
            metrics.records_failed,
            metrics.records_skipped,
            false,
        );

        if status == PipelineStatus::Failed {
            metrics.errors.push("No records successfully ingested".to_string());
        }

        info!(
            output = metrics.records_output,
            failed = metrics.records_failed,
            duration = metrics.duration_seconds,
            "Ingestion complete"
        );

        PipelineResult::new(self.name(), status, disclosures, metrics)
    }
}

/// Batched ingestion with an inter-batch delay, for rate-limited sources
/// and large datasets.
pub struct BatchIngestionStage {
    pub lookback_days: u32,
    pub batch_size: u64,
    pub delay_between_batches: f64,
    inner: IngestionStage,
}

impl BatchIngestionStage {
    pub fn new(lookback_days: u32) -> Self {
        Self {
            lookback_days,
            batch_size: 100,
            delay_between_batches: 1.0,
            inner: IngestionStage::new(lookback_days),
        }
    }

    pub fn with_storage(mut self, storage: Option<StorageManager>) -> Self {
        self.inner = self.inner.with_storage(storage);
        self
    }
}

#[async_trait]
impl PipelineStage<RawDisclosure, RawDisclosure> for BatchIngestionStage {
    fn name(&self) -> &'static str {
        "batch_ingestion"
    }

    async fn process(
        &self,
        _data: Vec<RawDisclosure>,
        context: &PipelineContext,
    ) -> PipelineResult<RawDisclosure> {
        let started = Utc::now();
        let mut metrics = PipelineMetrics::default();

        info!(
            source = %context.source_name,
            batch_size = self.batch_size,
            delay = self.delay_between_batches,
            "Starting batch ingestion"
        );

        let source = match self.inner.build_source(context) {
            Ok(source) => source,
            Err(message) => {
                metrics.errors.push(message.clone());
                let mut result =
                    PipelineResult::new(self.name(), PipelineStatus::Failed, Vec::new(), metrics);
                result.collected_errors.push(StageError::Stage(message));
                return result;
            }
        };

        let mut disclosures = Vec::new();
        let mut batch_num: u64 = 0;

        loop {
            if context.is_cancelled() {
                let mut result = PipelineResult::new(
                    self.name(),
                    PipelineStatus::Failed,
                    Vec::new(),
                    metrics,
                );
                result.collected_errors.push(StageError::Cancelled);
                return result;
            }

            let offset = batch_num * self.batch_size;
            let batch = match source
                .fetch_batch(offset, self.batch_size, self.lookback_days, &context.config)
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, batch = batch_num + 1, "Batch fetch failed");
                    metrics.errors.push(format!("Batch {}: {e}", batch_num + 1));
                    break;
                }
            };

            if batch.is_empty() {
                info!(batches = batch_num, "No more data to fetch");
                break;
            }

            metrics.records_input += batch.len() as u64;
            for item in batch {
                disclosures.push(RawDisclosure::new(
                    &context.source_name,
                    &context.source_type,
                    item,
                ));
                metrics.records_output += 1;
            }

            batch_num += 1;
            if self.delay_between_batches > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(self.delay_between_batches)).await;
            }
        }

        metrics.duration_seconds = elapsed_seconds(started);
        let status = PipelineStatus::from_counts(
            metrics.records_output,
            metrics.records_failed,
            metrics.records_skipped,
            false,
        );
        if status == PipelineStatus::Failed {
            metrics.errors.push("No records successfully ingested".to_string());
        }

        info!(
            output = metrics.records_output,
            batches = batch_num,
            duration = metrics.duration_seconds,
            "Batch ingestion complete"
        );

        PipelineResult::new(self.name(), status, disclosures, metrics)
    }
}

pub(crate) fn elapsed_seconds(started: chrono::DateTime<Utc>) -> f64 {
    (Utc::now() - started).num_milliseconds() as f64 / 1000.0
}
