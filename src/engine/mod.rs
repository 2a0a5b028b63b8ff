//! Pure computation: commission calculation, transition policy, reporting.

pub mod calculator;
pub mod policy;
pub mod summary;

pub use calculator::{compute_commission, CommissionAmounts, CommissionError};
pub use policy::TransitionPolicy;
pub use summary::{summarize, CommissionSummary, SummaryScope};
