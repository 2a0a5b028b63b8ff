pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    AgentId, Client, ClientId, CommissionComputed, CommissionSettings, Deal, DealId, Decimal,
    Offer, OfferStatus, Stage, TimeMs,
};
pub use error::AppError;
pub use orchestration::{CommissionCache, DealError, DealOrchestrator, GuardFailure};
