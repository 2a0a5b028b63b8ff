use crate::orchestration::DealError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Precondition failed: {message}")]
    Precondition { message: String, cause: &'static str },
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<DealError> for AppError {
    fn from(err: DealError) -> Self {
        match err {
            DealError::NotFound(msg) => AppError::NotFound(msg),
            DealError::Forbidden(msg) => AppError::Forbidden(msg),
            DealError::Validation(msg) => AppError::BadRequest(msg),
            DealError::Precondition { target, cause } => AppError::Precondition {
                message: format!("Cannot move to \"{target}\": {cause}"),
                cause: cause.code(),
            },
            DealError::Configuration(e) => AppError::Config(e.to_string()),
            DealError::Conflict(msg) => AppError::Conflict(msg),
            DealError::Db(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, cause) = match self {
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, None),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::Precondition { message, cause } => {
                (StatusCode::UNPROCESSABLE_ENTITY, message, Some(cause))
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
        };

        if status.is_server_error() {
            error!(status = status.as_u16(), error = %error_message, "Request failed");
        }

        let body = match cause {
            Some(cause) => json!({ "error": error_message, "cause": cause }),
            None => json!({ "error": error_message }),
        };

        (status, Json(body)).into_response()
    }
}
