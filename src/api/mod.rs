pub mod clients;
pub mod deals;
pub mod health;
pub mod identity;
pub mod summary;

use crate::config::Config;
use crate::db::Repository;
use crate::orchestration::DealOrchestrator;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub use identity::AgentIdentity;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub orchestrator: Arc<DealOrchestrator>,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, config: Config) -> Self {
        let orchestrator = Arc::new(DealOrchestrator::new(repo.clone(), &config));
        Self {
            repo,
            config,
            orchestrator,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/clients", post(clients::create_client))
        .route("/v1/clients/:id", get(clients::get_client))
        .route(
            "/v1/clients/:id/commission-settings",
            put(clients::save_commission_settings),
        )
        .route(
            "/v1/clients/:id/deals",
            post(clients::create_deal).get(clients::list_deals),
        )
        .route(
            "/v1/clients/:id/commission-summary",
            get(summary::get_client_summary),
        )
        .route(
            "/v1/deals/:id",
            get(deals::get_deal).delete(deals::delete_deal),
        )
        .route("/v1/deals/:id/offer", put(deals::upsert_offer))
        .route("/v1/deals/:id/stage", put(deals::advance_stage))
        .route("/v1/deals/:id/stage-history", get(deals::stage_history))
        .route(
            "/v1/deals/:id/commission/recompute",
            post(deals::recompute_commission),
        )
        .route("/v1/commission-summary", get(summary::get_agent_summary))
        .layer(cors)
        .with_state(state)
}

/// Interpret a `vat=` style query flag. Accepts `1`/`true`/`yes`.
pub(crate) fn parse_flag(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|s| s.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes")
    )
}
