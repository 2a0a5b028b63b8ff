use crate::api::{parse_flag, AgentIdentity, AppState};
use crate::domain::ClientId;
use crate::engine::{CommissionSummary, SummaryScope};
use crate::error::AppError;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub scope: Option<String>,
    pub vat: Option<String>,
}

/// Expected and earned commission across all of the agent's clients.
pub async fn get_agent_summary(
    State(state): State<AppState>,
    AgentIdentity(agent): AgentIdentity,
    Query(params): Query<SummaryQuery>,
) -> Result<Json<CommissionSummary>, AppError> {
    let summary = state
        .orchestrator
        .commission_summary(
            &agent,
            None,
            SummaryScope::parse_lenient(params.scope.as_deref()),
            parse_flag(params.vat.as_deref()),
        )
        .await?;
    Ok(Json(summary))
}

pub async fn get_client_summary(
    State(state): State<AppState>,
    AgentIdentity(agent): AgentIdentity,
    Path(id): Path<String>,
    Query(params): Query<SummaryQuery>,
) -> Result<Json<CommissionSummary>, AppError> {
    let client_id = ClientId::new(id);
    let summary = state
        .orchestrator
        .commission_summary(
            &agent,
            Some(&client_id),
            SummaryScope::parse_lenient(params.scope.as_deref()),
            parse_flag(params.vat.as_deref()),
        )
        .await?;
    Ok(Json(summary))
}
