use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    /// Deleting a lot whose remaining value is above the dust floor without
    /// `forceDelete: true`.
    #[error("Force required: {0}")]
    NeedForce(String),
    /// TP/SL-triggered close while automation is not armed.
    #[error("Automation not armed: {0}")]
    NeedsArm(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<crate::oracle::OracleError> for AppError {
    fn from(err: crate::oracle::OracleError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<crate::orchestration::TradeError> for AppError {
    fn from(err: crate::orchestration::TradeError) -> Self {
        use crate::orchestration::TradeError;
        match err {
            TradeError::Validation(msg) => AppError::BadRequest(msg),
            TradeError::NotFound(msg) => AppError::NotFound(msg),
            TradeError::NeedForce(msg) => AppError::NeedForce(msg),
            TradeError::NeedsArm(msg) => AppError::NeedsArm(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl AppError {
    /// The status and JSON body this error renders as. Exposed separately
    /// from `into_response` so the idempotency layer can cache the pair.
    pub fn to_outcome(&self) -> (StatusCode, serde_json::Value) {
        match self {
            AppError::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": msg }),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": msg }),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::NeedForce(msg) => (
                StatusCode::FORBIDDEN,
                json!({ "error": msg, "needForce": true }),
            ),
            AppError::NeedsArm(msg) => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": msg, "needsArm": true }),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.to_outcome();
        (status, Json(body)).into_response()
    }
}
