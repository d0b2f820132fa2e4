//! Data transformers used by the normalization stage and the data
//! quality batch jobs.

pub mod amount;
pub mod matcher;
pub mod normalizer;
pub mod ticker;

pub use amount::AmountParser;
pub use matcher::{MatchOutcome, PoliticianMatcher};
pub use normalizer::{PoliticianNormalizer, TickerAutoCorrector};
pub use ticker::TickerExtractor;
