//! Deal endpoints: offer edits, stage moves, history and recompute.

use crate::api::{AgentIdentity, AppState};
use crate::domain::{CommissionComputed, Deal, DealId, OfferPatch, StageChange};
use crate::error::AppError;
use crate::orchestration::{GuardFailure, OfferChangeOutcome, Recomputation, TransitionOutcome};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceStageRequest {
    pub stage: String,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StageHistoryResponse {
    pub history: Vec<StageChange>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeResponse {
    pub commission_computed: Option<CommissionComputed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl From<Recomputation> for RecomputeResponse {
    fn from(recomputation: Recomputation) -> Self {
        match recomputation {
            Recomputation::Computed(snapshot) => RecomputeResponse {
                commission_computed: Some(snapshot),
                reason: None,
            },
            Recomputation::NotComputable(reason) => RecomputeResponse {
                commission_computed: None,
                reason: Some(GuardFailure::from(reason).code()),
            },
        }
    }
}

pub async fn get_deal(
    State(state): State<AppState>,
    AgentIdentity(agent): AgentIdentity,
    Path(id): Path<String>,
) -> Result<Json<Deal>, AppError> {
    let deal = state
        .orchestrator
        .get_deal_for_agent(&DealId::new(id), &agent)
        .await?;
    Ok(Json(deal))
}

pub async fn delete_deal(
    State(state): State<AppState>,
    AgentIdentity(agent): AgentIdentity,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state
        .orchestrator
        .delete_deal(&DealId::new(id), &agent)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn upsert_offer(
    State(state): State<AppState>,
    AgentIdentity(agent): AgentIdentity,
    Path(id): Path<String>,
    Json(patch): Json<OfferPatch>,
) -> Result<Json<OfferChangeOutcome>, AppError> {
    let outcome = state
        .orchestrator
        .upsert_offer(&DealId::new(id), &agent, patch)
        .await?;
    Ok(Json(outcome))
}

pub async fn advance_stage(
    State(state): State<AppState>,
    AgentIdentity(agent): AgentIdentity,
    Path(id): Path<String>,
    Json(body): Json<AdvanceStageRequest>,
) -> Result<Json<TransitionOutcome>, AppError> {
    let outcome = state
        .orchestrator
        .advance_stage(&DealId::new(id), &agent, &body.stage, body.note)
        .await?;
    Ok(Json(outcome))
}

pub async fn stage_history(
    State(state): State<AppState>,
    AgentIdentity(agent): AgentIdentity,
    Path(id): Path<String>,
) -> Result<Json<StageHistoryResponse>, AppError> {
    let history = state
        .orchestrator
        .stage_history(&DealId::new(id), &agent)
        .await?;
    Ok(Json(StageHistoryResponse { history }))
}

pub async fn recompute_commission(
    State(state): State<AppState>,
    AgentIdentity(agent): AgentIdentity,
    Path(id): Path<String>,
) -> Result<Json<RecomputeResponse>, AppError> {
    let recomputation = state
        .orchestrator
        .recompute_deal(&DealId::new(id), &agent)
        .await?;
    Ok(Json(recomputation.into()))
}
