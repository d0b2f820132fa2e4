//! Core types shared across the Tradewatch ingestion pipeline.
//!
//! These types are the single source of truth for records moving between
//! pipeline stages. Database entity types live in `tradewatch_db`.

pub mod config;
pub mod dates;
pub mod pipeline;
pub mod types;

pub use config::{AppConfig, ConfigError, SourceConfig};
pub use dates::parse_disclosure_date;
pub use pipeline::{
    PipelineContext, PipelineMetrics, PipelineResult, PipelineStatus, StageError,
};
pub use types::{
    AssetType, CleanedDisclosure, NormalizedDisclosure, PublishStats, PublishedRecord,
    RawDisclosure, RawRecord, TransactionType,
};
