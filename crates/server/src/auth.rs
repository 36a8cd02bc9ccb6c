use axum::async_trait;
use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use auction_core::CoreError;

use crate::error::ApiError;

/// The caller's identity, trusted and never re-derived from the request
/// body (spec.md §6). Bearer-token issuance and verification are out of
/// scope (spec.md §1); this crate only consumes the id an upstream
/// authentication layer is expected to attach.
#[derive(Debug, Clone, Copy)]
pub struct CallerId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerId>()
            .copied()
            .ok_or_else(|| ApiError(CoreError::Unauthenticated))
    }
}

/// Stand-in for the real upstream bearer-token middleware: reads an
/// already-verified caller id out of `X-Caller-Id` and attaches it as a
/// request extension. A production deployment replaces this layer
/// entirely; the core only ever sees the resulting `CallerId`.
pub async fn inject_caller_id(mut request: Request, next: Next) -> Response {
    if let Some(header) = request.headers().get("x-caller-id") {
        if let Ok(text) = header.to_str() {
            if let Ok(id) = Uuid::parse_str(text) {
                request.extensions_mut().insert(CallerId(id));
            }
        }
    }
    next.run(request).await
}
