//! Source adapters for politician financial-disclosure data.
//!
//! Each external origin gets one adapter implementing [`DisclosureSource`].
//! Adapters share an [`HttpFetcher`] that enforces rate limiting and
//! retry/backoff, and archive raw payloads through the storage manager
//! when one is attached.

pub mod error;
pub mod eu_parliament;
pub mod http;
pub mod pdf_text;
pub mod quiverquant;
pub mod registry;
pub mod source;
pub mod uk_parliament;
pub mod us_house;
pub mod us_senate;
pub mod us_states;

pub use error::{Result, SourceError};
pub use http::HttpFetcher;
pub use pdf_text::{extract_transactions_from_text, NullPdfTextExtractor, PdfTextExtractor};
pub use registry::{create_source, SourceKind};
pub use source::DisclosureSource;
