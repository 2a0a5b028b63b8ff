#![allow(dead_code)]

use axum::http::StatusCode;
use dealdesk::api;
use dealdesk::config::Config;
use dealdesk::db::init_db;
use dealdesk::engine::TransitionPolicy;
use dealdesk::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub const AGENT: &str = "agent-1";
pub const OTHER_AGENT: &str = "agent-2";

pub struct TestApp {
    pub app: axum::Router,
    pub repo: Arc<dealdesk::Repository>,
    _temp: TempDir,
}

pub async fn setup_test_app(policy: TransitionPolicy) -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(dealdesk::Repository::new(pool));

    let config = Config {
        port: 0,
        database_path: db_path,
        vat_rate: Decimal::from_str("0.20").unwrap(),
        default_currency: "GBP".to_string(),
        stage_policy: policy,
    };

    let app = api::create_router(api::AppState::new(repo.clone(), config));

    TestApp {
        app,
        repo,
        _temp: temp_dir,
    }
}

impl TestApp {
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        agent: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        if let Some(agent) = agent {
            builder = builder.header("x-agent-id", agent);
        }
        let req = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(axum::body::Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(axum::body::Body::empty()).unwrap(),
        };

        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request("GET", uri, Some(AGENT), None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, Some(AGENT), Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request("PUT", uri, Some(AGENT), Some(body)).await
    }

    /// Create a client and one deal owned by `AGENT`. Returns (client id, deal id).
    pub async fn client_with_deal(&self) -> (String, String) {
        let (status, client) = self
            .post(
                "/v1/clients",
                serde_json::json!({"name": "Jane Buyer", "email": "Jane@Example.com"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let client_id = client["id"].as_str().unwrap().to_string();

        let (status, deal) = self
            .post(
                &format!("/v1/clients/{client_id}/deals"),
                serde_json::json!({
                    "name": "12 Elm Road",
                    "propertyAddress": "12 Elm Road, Bath",
                    "dealType": "Buyer Rep"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let deal_id = deal["id"].as_str().unwrap().to_string();
        (client_id, deal_id)
    }
}

pub fn dec(value: &Value) -> Decimal {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => panic!("not a decimal: {other}"),
    };
    Decimal::from_str(&raw).unwrap()
}

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}
