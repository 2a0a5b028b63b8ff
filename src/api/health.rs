use crate::api::AppState;
use crate::error::AppError;
use axum::extract::State;
use axum::Json;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Ready once the database answers. Echoes the settings the server runs with.
pub async fn ready(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    state
        .repo
        .ping()
        .await
        .map_err(|e| AppError::Internal(format!("Database unavailable: {}", e)))?;
    Ok(Json(serde_json::json!({
        "status": "ready",
        "stagePolicy": state.config.stage_policy.as_str(),
        "defaultCurrency": state.config.default_currency,
        "vatRate": state.config.vat_rate,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::{init_db, Repository};
    use crate::domain::Decimal;
    use crate::engine::TransitionPolicy;
    use std::str::FromStr;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_health_returns_ok() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_ready_returns_ready() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        let config = Config {
            port: 0,
            database_path: db_path,
            vat_rate: Decimal::from_str("0.20").unwrap(),
            default_currency: "GBP".to_string(),
            stage_policy: TransitionPolicy::ForwardOnly,
        };
        let state = AppState::new(Arc::new(Repository::new(pool)), config);

        let Json(body) = ready(State(state)).await.unwrap();
        assert_eq!(body["status"], "ready");
        assert_eq!(body["stagePolicy"], "forward_only");
        assert_eq!(body["defaultCurrency"], "GBP");
        assert_eq!(body["vatRate"], 0.2);
    }
}
