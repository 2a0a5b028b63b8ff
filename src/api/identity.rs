//! Agent identity taken from the `x-agent-id` request header.

use crate::domain::AgentId;
use crate::error::AppError;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

pub const AGENT_HEADER: &str = "x-agent-id";

/// The agent making the request.
#[derive(Debug, Clone)]
pub struct AgentIdentity(pub AgentId);

#[async_trait]
impl<S> FromRequestParts<S> for AgentIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(AGENT_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("missing {AGENT_HEADER} header")))?;
        let agent = value
            .to_str()
            .map(str::trim)
            .map_err(|_| AppError::Unauthorized(format!("invalid {AGENT_HEADER} header")))?;
        if agent.is_empty() {
            return Err(AppError::Unauthorized(format!("empty {AGENT_HEADER} header")));
        }
        Ok(AgentIdentity(AgentId::new(agent)))
    }
}
