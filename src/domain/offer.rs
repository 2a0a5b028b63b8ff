//! The single active offer attached to a deal.

use super::{Decimal, TimeMs};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OfferStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "Pending",
            OfferStatus::Accepted => "Accepted",
            OfferStatus::Rejected => "Rejected",
            OfferStatus::Withdrawn => "Withdrawn",
        }
    }
}

impl FromStr for OfferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(OfferStatus::Pending),
            "Accepted" => Ok(OfferStatus::Accepted),
            "Rejected" => Ok(OfferStatus::Rejected),
            "Withdrawn" => Ok(OfferStatus::Withdrawn),
            other => Err(format!("unknown offer status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub offer_number: String,
    pub amount: Option<Decimal>,
    pub status: OfferStatus,
    pub date: Option<TimeMs>,
    pub expiry_date: Option<TimeMs>,
    pub proof_of_funds_attached: bool,
    pub conditions: Option<String>,
}

impl Offer {
    /// A fresh pending offer with a generated `OFF-YYYYMMDD-NNNNN` number.
    pub fn new_pending() -> Self {
        Offer {
            offer_number: generate_offer_number(),
            amount: None,
            status: OfferStatus::Pending,
            date: None,
            expiry_date: None,
            proof_of_funds_attached: false,
            conditions: None,
        }
    }

    /// The amount a commission can be computed from, if any.
    ///
    /// Requires an accepted offer with a strictly positive amount.
    pub fn commissionable_amount(&self) -> Option<Decimal> {
        match (self.status, self.amount) {
            (OfferStatus::Accepted, Some(amount)) if amount.is_positive() => Some(amount),
            _ => None,
        }
    }

    /// Merge a partial update into this offer. Absent fields keep their value.
    pub fn apply(&mut self, patch: OfferPatch) {
        if let Some(amount) = patch.amount {
            self.amount = Some(amount);
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(date) = patch.date {
            self.date = Some(date);
        }
        if let Some(expiry) = patch.expiry_date {
            self.expiry_date = Some(expiry);
        }
        if let Some(pof) = patch.proof_of_funds_attached {
            self.proof_of_funds_attached = pof;
        }
        if let Some(conditions) = patch.conditions {
            self.conditions = Some(conditions);
        }
    }
}

fn generate_offer_number() -> String {
    let suffix = 10_000 + (uuid::Uuid::new_v4().as_u128() % 90_000);
    format!("OFF-{}-{}", chrono::Utc::now().format("%Y%m%d"), suffix)
}

/// Partial offer update sent by the offer-editing flow.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferPatch {
    pub amount: Option<Decimal>,
    pub status: Option<OfferStatus>,
    pub date: Option<TimeMs>,
    pub expiry_date: Option<TimeMs>,
    pub proof_of_funds_attached: Option<bool>,
    pub conditions: Option<String>,
}
