//! Deal stages along the single linear track.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stage of a deal, ordered `Discovery < ... < Completion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "Discovery")]
    Discovery,
    #[serde(rename = "Viewings")]
    Viewings,
    #[serde(rename = "Offer Mode", alias = "OfferMode")]
    OfferMode,
    #[serde(rename = "Offer Accepted", alias = "OfferAccepted")]
    OfferAccepted,
    #[serde(rename = "Exchange")]
    Exchange,
    #[serde(rename = "Completion")]
    Completion,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Discovery,
        Stage::Viewings,
        Stage::OfferMode,
        Stage::OfferAccepted,
        Stage::Exchange,
        Stage::Completion,
    ];

    /// Display/storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Discovery => "Discovery",
            Stage::Viewings => "Viewings",
            Stage::OfferMode => "Offer Mode",
            Stage::OfferAccepted => "Offer Accepted",
            Stage::Exchange => "Exchange",
            Stage::Completion => "Completion",
        }
    }

    /// Stages that may only be entered with a priced commission attached.
    pub fn requires_commission(&self) -> bool {
        matches!(self, Stage::OfferAccepted | Stage::Exchange)
    }

    /// Progress through the pipeline, as shown on deal cards.
    pub fn progress_pct(&self) -> f64 {
        match self {
            Stage::Discovery => 0.0,
            Stage::Viewings => 16.67,
            Stage::OfferMode => 33.33,
            Stage::OfferAccepted => 50.0,
            Stage::Exchange => 83.33,
            Stage::Completion => 100.0,
        }
    }

    /// Commission bucket for reporting.
    pub fn bucket(&self) -> Option<Bucket> {
        match self {
            Stage::OfferAccepted => Some(Bucket::Expected),
            Stage::Exchange => Some(Bucket::Earned),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid stage {0:?}; valid stages are: Discovery, Viewings, Offer Mode, Offer Accepted, Exchange, Completion")]
pub struct StageParseError(pub String);

impl FromStr for Stage {
    type Err = StageParseError;

    /// Accepts both the spaced display names and the compact spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Discovery" => Ok(Stage::Discovery),
            "Viewings" => Ok(Stage::Viewings),
            "Offer Mode" | "OfferMode" => Ok(Stage::OfferMode),
            "Offer Accepted" | "OfferAccepted" => Ok(Stage::OfferAccepted),
            "Exchange" => Ok(Stage::Exchange),
            "Completion" => Ok(Stage::Completion),
            other => Err(StageParseError(other.to_string())),
        }
    }
}

/// UI hint for where a deal's commission is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bucket {
    Expected,
    Earned,
}
