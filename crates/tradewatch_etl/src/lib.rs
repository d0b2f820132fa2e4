//! ETL service framework.
//!
//! Adjacent services run per-source ETL at a finer granularity than the
//! pipeline: fetch, then parse/validate/upload record by record, with a
//! live job-status entry and a standardized result. Services register in
//! an [`EtlRegistry`] keyed by source id.

pub mod registry;
pub mod result;
pub mod service;
pub mod services;

pub use registry::EtlRegistry;
pub use result::{EtlResult, JobProgress};
pub use service::EtlService;
pub use services::{QuiverQuantEtl, SenateEtl};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EtlError {
    #[error("Service already registered for source '{0}'")]
    DuplicateRegistration(String),

    #[error("No service registered for source '{0}'")]
    UnknownSource(String),
}
