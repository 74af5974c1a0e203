//! Sanctions list entries
//!
//! Entries are deduplicated on `(normalized_name, source)`. The normalized
//! form is computed by the screening crate's normalization function; the same
//! function is used at ingestion and at query time so scores stay comparable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::SanctionId;

/// Origin list of a sanctions entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SanctionSource {
    Ofac,
    Un,
    Eu,
    Other,
}

impl SanctionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ofac => "OFAC",
            Self::Un => "UN",
            Self::Eu => "EU",
            Self::Other => "OTHER",
        }
    }
}

impl std::str::FromStr for SanctionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OFAC" => Ok(Self::Ofac),
            "UN" => Ok(Self::Un),
            "EU" => Ok(Self::Eu),
            "OTHER" => Ok(Self::Other),
            _ => Err(format!("Invalid sanction source: {}", s)),
        }
    }
}

impl std::fmt::Display for SanctionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single sanctions list entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanctionEntry {
    pub id: SanctionId,
    /// Name as published by the source list
    pub name: String,
    /// Uppercased, punctuation stripped, whitespace collapsed
    pub normalized_name: String,
    pub source: SanctionSource,
    /// Source-assigned risk in [0, 100]
    pub risk_score: u8,
    pub listed_at: DateTime<Utc>,
}
