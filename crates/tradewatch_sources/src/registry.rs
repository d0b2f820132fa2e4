//! Source factory.
//!
//! An explicit tagged-variant table rather than reflection: every source
//! type the orchestrator can resolve is listed here.

use crate::eu_parliament::EuParliamentSource;
use crate::quiverquant::QuiverQuantSource;
use crate::source::DisclosureSource;
use crate::uk_parliament::UkParliamentSource;
use crate::us_house::UsHouseSource;
use crate::us_senate::UsSenateSource;
use crate::us_states::StateRegistrySource;
use serde::{Deserialize, Serialize};

/// Every registered source type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    UsHouse,
    UsSenate,
    UkParliament,
    EuParliament,
    California,
    NewYork,
    Texas,
    QuiverQuant,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UsHouse => "us_house",
            Self::UsSenate => "us_senate",
            Self::UkParliament => "uk_parliament",
            Self::EuParliament => "eu_parliament",
            Self::California => "california",
            Self::NewYork => "new_york",
            Self::Texas => "texas",
            Self::QuiverQuant => "quiverquant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "us_house" => Some(Self::UsHouse),
            "us_senate" => Some(Self::UsSenate),
            "uk_parliament" => Some(Self::UkParliament),
            "eu_parliament" => Some(Self::EuParliament),
            "california" => Some(Self::California),
            "new_york" => Some(Self::NewYork),
            "texas" => Some(Self::Texas),
            "quiverquant" => Some(Self::QuiverQuant),
            _ => None,
        }
    }

    pub fn all() -> &'static [SourceKind] {
        &[
            Self::UsHouse,
            Self::UsSenate,
            Self::UkParliament,
            Self::EuParliament,
            Self::California,
            Self::NewYork,
            Self::Texas,
            Self::QuiverQuant,
        ]
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Construct a fresh adapter for a source type.
pub fn create_source(kind: SourceKind) -> Box<dyn DisclosureSource> {
    match kind {
        SourceKind::UsHouse => Box::new(UsHouseSource::new()),
        SourceKind::UsSenate => Box::new(UsSenateSource::new()),
        SourceKind::UkParliament => Box::new(UkParliamentSource::new()),
        SourceKind::EuParliament => Box::new(EuParliamentSource::new()),
        SourceKind::California => Box::new(StateRegistrySource::california()),
        SourceKind::NewYork => Box::new(StateRegistrySource::new_york()),
        SourceKind::Texas => Box::new(StateRegistrySource::texas()),
        SourceKind::QuiverQuant => Box::new(QuiverQuantSource::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for kind in SourceKind::all() {
            assert_eq!(SourceKind::parse(kind.as_str()), Some(*kind));
        }
        assert_eq!(SourceKind::parse("unknown"), None);
    }

    #[test]
    fn test_factory_config_matches_kind() {
        for kind in SourceKind::all() {
            let source = create_source(*kind);
            assert_eq!(source.config().source_type, kind.as_str());
        }
    }
}
