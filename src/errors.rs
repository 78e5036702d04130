// src/errors.rs
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::time::Duration;

/// Why a webhook payload could not be turned into a `TradeEvent`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("payload must be a JSON object")]
    NotAnObject,

    #[error("missing event_type")]
    MissingEventType,

    #[error("unknown event_type: {0}")]
    UnknownEventType(String),

    #[error("missing trade_id")]
    MissingTradeId,

    #[error("malformed trade_id '{0}': expected YYYYMMDD_HHMMSSfff_DIRECTION")]
    MalformedTradeId(String),

    #[error("missing {0} on ENTRY event")]
    MissingPrice(&'static str),

    #[error("{field} is not a finite decimal: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("invalid {field}: {value}")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("unknown direction: {0}")]
    UnknownDirection(String),

    #[error("unknown variant: {0}")]
    UnknownVariant(String),

    #[error("entry_price equals stop_loss_price, risk distance is zero")]
    ZeroRisk,

    #[error("risk distance between entry_price and stop_loss_price is out of range")]
    RiskOverflow,

    #[error("batch payload 'signals' must be an array")]
    InvalidBatch,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt stored event {trade_id}: {reason}")]
    Corrupt { trade_id: String, reason: String },

    #[error("storage did not respond within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error("trade not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) | ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            // retryable by the indicator
            ServiceError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            ServiceError::Storage(e) => tracing::error!("Storage error: {}", e),
            ServiceError::Validation(e) => tracing::warn!("Rejected payload: {}", e),
            _ => tracing::debug!("Request failed: {}", self),
        }
        let body = json!({
            "success": false,
            "error": self.to_string(),
            "retryable": status == StatusCode::SERVICE_UNAVAILABLE,
        });
        (status, Json(body)).into_response()
    }
}
