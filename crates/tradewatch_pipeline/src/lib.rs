//! The four-stage ingestion pipeline: Ingest, Clean, Normalize, Publish.
//!
//! Stages are pure transforms over owned record vectors; the orchestrator
//! composes them per source and aggregates a run summary. Transformers
//! (ticker extraction, amount parsing, politician matching) live under
//! `transformers`.

pub mod clean;
pub mod ingest;
pub mod normalize;
pub mod orchestrator;
pub mod publish;
pub mod stage;
pub mod transformers;

pub use clean::CleaningStage;
pub use ingest::{BatchIngestionStage, IngestionStage};
pub use normalize::NormalizationStage;
pub use orchestrator::{FallbackDriver, Orchestrator, RunSummary, StageSummary};
pub use publish::PublishingStage;
pub use stage::PipelineStage;
