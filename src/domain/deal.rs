//! Deal and client records.

use super::{
    AgentId, ClientId, CommissionComputed, CommissionSettings, DealId, Offer, Stage, TimeMs,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DealType {
    #[serde(rename = "Buyer Rep")]
    BuyerRep,
    #[serde(rename = "Seller Rep")]
    SellerRep,
    Development,
    Investment,
}

impl DealType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealType::BuyerRep => "Buyer Rep",
            DealType::SellerRep => "Seller Rep",
            DealType::Development => "Development",
            DealType::Investment => "Investment",
        }
    }
}

impl FromStr for DealType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Buyer Rep" => Ok(DealType::BuyerRep),
            "Seller Rep" => Ok(DealType::SellerRep),
            "Development" => Ok(DealType::Development),
            "Investment" => Ok(DealType::Investment),
            other => Err(format!("unknown deal type {other:?}")),
        }
    }
}

/// A property transaction tracked through the stage pipeline.
///
/// `stage` and `stage_updated_at` are only written by the stage transition
/// service; `commission_computed` only by the commission cache. `version`
/// increments on every such write and backs compare-and-swap updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id: DealId,
    pub client_id: ClientId,
    pub assigned_agent: AgentId,
    pub name: String,
    pub property_address: Option<String>,
    pub deal_type: DealType,
    pub stage: Stage,
    pub stage_updated_at: TimeMs,
    pub offer: Offer,
    pub commission_computed: Option<CommissionComputed>,
    pub created_at: TimeMs,
    #[serde(skip)]
    pub version: i64,
}

impl Deal {
    /// A new deal in `Discovery` with an empty pending offer.
    pub fn new(
        client_id: ClientId,
        assigned_agent: AgentId,
        name: String,
        property_address: Option<String>,
        deal_type: DealType,
    ) -> Self {
        let now = TimeMs::now();
        Deal {
            id: DealId::generate(),
            client_id,
            assigned_agent,
            name,
            property_address,
            deal_type,
            stage: Stage::Discovery,
            stage_updated_at: now,
            offer: Offer::new_pending(),
            commission_computed: None,
            created_at: now,
            version: 0,
        }
    }

    pub fn is_owned_by(&self, agent: &AgentId) -> bool {
        &self.assigned_agent == agent
    }
}

/// A client of an agent. Owns the commission settings applied to its deals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: ClientId,
    pub client_code: String,
    pub name: String,
    pub email: Option<String>,
    pub assigned_agent: AgentId,
    pub commission_settings: Option<CommissionSettings>,
    pub created_at: TimeMs,
}

impl Client {
    pub fn new(name: String, email: Option<String>, assigned_agent: AgentId) -> Self {
        Client {
            id: ClientId::generate(),
            client_code: generate_client_code(),
            name,
            email: email.map(|e| e.trim().to_lowercase()),
            assigned_agent,
            commission_settings: None,
            created_at: TimeMs::now(),
        }
    }

    pub fn is_owned_by(&self, agent: &AgentId) -> bool {
        &self.assigned_agent == agent
    }
}

fn generate_client_code() -> String {
    let t = chrono::Utc::now().timestamp_millis();
    let r = uuid::Uuid::new_v4().simple().to_string();
    format!("CLT-{:X}-{}", t, &r[..6]).to_uppercase()
}

/// One genuine stage change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageChange {
    pub deal_id: DealId,
    pub from_stage: Stage,
    pub to_stage: Stage,
    pub changed_at: TimeMs,
    pub note: Option<String>,
}
