//! Services that read and write deals: commission cache, stage transitions,
//! and the inbound workflows that tie them together.

pub mod commission_cache;
pub mod orchestrator;
pub mod stage_transition;

pub use commission_cache::{
    BulkRecompute, CommissionCache, CommissionRecomputer, NotComputableReason, Recomputation,
};
pub use orchestrator::{DealOrchestrator, DealView, NewDeal, OfferChangeOutcome, SettingsSaved};
pub use stage_transition::{StageTransitionService, TransitionOutcome};

use crate::domain::Stage;
use crate::engine::CommissionError;
use std::fmt;
use thiserror::Error;

/// Attempts at a compare-and-swap write before reporting a conflict.
pub(crate) const MAX_CAS_ATTEMPTS: usize = 5;

/// Why a guarded stage transition was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardFailure {
    /// The owning client has no commission settings.
    MissingSettings,
    /// The offer is not accepted, or its amount is not positive.
    NoAcceptedOffer,
    /// A commission was computed but its net is zero.
    ZeroNet,
    /// Prerequisites are met but no commission is cached; recompute first.
    NotComputed,
    /// The configured policy forbids moving backwards.
    StageRegression { from: Stage },
}

impl GuardFailure {
    /// Stable machine-readable cause.
    pub fn code(&self) -> &'static str {
        match self {
            GuardFailure::MissingSettings => "missing_settings",
            GuardFailure::NoAcceptedOffer => "no_accepted_offer",
            GuardFailure::ZeroNet => "zero_net",
            GuardFailure::NotComputed => "not_computed",
            GuardFailure::StageRegression { .. } => "stage_regression",
        }
    }
}

impl fmt::Display for GuardFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardFailure::MissingSettings => f.write_str("client has no commission settings"),
            GuardFailure::NoAcceptedOffer => {
                f.write_str("deal has no accepted offer with a positive amount")
            }
            GuardFailure::ZeroNet => f.write_str("computed commission is zero"),
            GuardFailure::NotComputed => {
                f.write_str("commission has not been computed for the current offer")
            }
            GuardFailure::StageRegression { from } => {
                write!(f, "cannot move backwards from \"{from}\"")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum DealError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Cannot move to \"{target}\": {cause}")]
    Precondition { target: Stage, cause: GuardFailure },
    #[error(transparent)]
    Configuration(#[from] CommissionError),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}
