use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

/// Every error kind surfaced to clients. All are reported as structured
/// refusals at the ingress boundary; none are recoverable inside the core —
/// the client is expected to correct and resubmit.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("blocked: client is blocked due to a prior risk violation")]
    Blocked,

    #[error("rate_limit: order rate limit exceeded")]
    RateLimit,

    #[error("size_limit: {0}")]
    SizeLimit(String),

    #[error("position_limit: {0}")]
    PositionLimit(String),

    #[error("price_bounds: {0}")]
    PriceBounds(String),

    #[error("daily_loss: {0}")]
    DailyLoss(String),

    #[error("not_found: {0}")]
    NotFound(String),

    #[error("not_cancelable: {0}")]
    NotCancelable(String),

    #[error("bad_request: {0}")]
    BadRequest(String),
}

impl EngineError {
    fn status(&self) -> StatusCode {
        match self {
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
