//! Domain types for the deal pipeline and commission engine.
//!
//! This module provides:
//! - Lossless money handling via the Decimal wrapper
//! - Identifier primitives: DealId, ClientId, AgentId, TimeMs
//! - Stage, Offer, Deal and Client records
//! - Commission settings, validation and the cached commission snapshot

pub mod commission;
pub mod deal;
pub mod decimal;
pub mod offer;
pub mod primitives;
pub mod stage;

pub use commission::{
    CommissionComputed, CommissionSettings, CommissionSettingsInput, CommissionSource,
    CommissionType, EngagementType, SettingsError, DEFAULT_CURRENCY, MAX_MONEY_AMOUNT,
    MAX_RATE_PCT,
};
pub use deal::{Client, Deal, DealType, StageChange};
pub use decimal::Decimal;
pub use offer::{Offer, OfferPatch, OfferStatus};
pub use primitives::{AgentId, ClientId, DealId, TimeMs};
pub use stage::{Bucket, Stage, StageParseError};
