use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use auction_core::CoreError;

/// Wraps `CoreError` so it can implement `axum::response::IntoResponse`
/// without `auction-core` taking a dependency on axum (spec.md §7: each
/// error kind maps 1:1 to an HTTP status; none leaks an internal detail).
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            CoreError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            CoreError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated".to_string()),
            CoreError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".to_string()),
            CoreError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            CoreError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            CoreError::InsufficientFunds => {
                (StatusCode::PAYMENT_REQUIRED, "insufficient funds".to_string())
            }
            CoreError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "timed out".to_string()),
            CoreError::Internal => {
                tracing::error!("internal error surfaced to a handler");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
