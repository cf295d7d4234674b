//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::MarketError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// The acting user is missing or unknown.
    Unauthorized(String),
    /// Error raised by the marketplace core.
    Market(MarketError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Market(err) => market_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn market_error_to_response(err: MarketError) -> (StatusCode, String) {
    match &err {
        MarketError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        MarketError::InsufficientStock { .. }
        | MarketError::InvalidTransition(_)
        | MarketError::Conflict(_) => (StatusCode::CONFLICT, err.to_string()),
        MarketError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        MarketError::Forbidden { .. } => (StatusCode::FORBIDDEN, err.to_string()),
        MarketError::Timeout => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        MarketError::Internal(cause) => {
            tracing::error!(error = %cause, "internal server error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            )
        }
    }
}

impl From<MarketError> for ApiError {
    fn from(err: MarketError) -> Self {
        ApiError::Market(err)
    }
}
