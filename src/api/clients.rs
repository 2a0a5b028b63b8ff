//! Client endpoints: creation, commission settings and the client's deals.

use crate::api::{parse_flag, AgentIdentity, AppState};
use crate::domain::{Client, ClientId, CommissionSettingsInput, Deal};
use crate::error::AppError;
use crate::orchestration::{DealView, NewDeal, SettingsSaved};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListDealsQuery {
    pub vat: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListDealsResponse {
    pub deals: Vec<DealView>,
}

pub async fn create_client(
    State(state): State<AppState>,
    AgentIdentity(agent): AgentIdentity,
    Json(body): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<Client>), AppError> {
    let client = state
        .orchestrator
        .create_client(&agent, &body.name, body.email)
        .await?;
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn get_client(
    State(state): State<AppState>,
    AgentIdentity(agent): AgentIdentity,
    Path(id): Path<String>,
) -> Result<Json<Client>, AppError> {
    let client = state
        .orchestrator
        .get_client_for_agent(&ClientId::new(id), &agent)
        .await?;
    Ok(Json(client))
}

/// Replace the client's settings and re-price its accepted deals.
pub async fn save_commission_settings(
    State(state): State<AppState>,
    AgentIdentity(agent): AgentIdentity,
    Path(id): Path<String>,
    Json(body): Json<CommissionSettingsInput>,
) -> Result<Json<SettingsSaved>, AppError> {
    let saved = state
        .orchestrator
        .on_commission_settings_saved(&ClientId::new(id), &agent, body)
        .await?;
    Ok(Json(saved))
}

pub async fn create_deal(
    State(state): State<AppState>,
    AgentIdentity(agent): AgentIdentity,
    Path(id): Path<String>,
    Json(body): Json<NewDeal>,
) -> Result<(StatusCode, Json<Deal>), AppError> {
    let deal = state
        .orchestrator
        .create_deal(&ClientId::new(id), &agent, body)
        .await?;
    Ok((StatusCode::CREATED, Json(deal)))
}

pub async fn list_deals(
    State(state): State<AppState>,
    AgentIdentity(agent): AgentIdentity,
    Path(id): Path<String>,
    Query(params): Query<ListDealsQuery>,
) -> Result<Json<ListDealsResponse>, AppError> {
    let deals = state
        .orchestrator
        .list_client_deals(&ClientId::new(id), &agent, parse_flag(params.vat.as_deref()))
        .await?;
    Ok(Json(ListDealsResponse { deals }))
}
