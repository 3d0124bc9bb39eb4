//! Webhook signature middleware
//!
//! Buffers the body, checks the carrier signature over the public URL and
//! the body, and rejects with 403 before any handler runs.

use super::webhook_handler::AppState;
use crate::infrastructure::carrier::SIGNATURE_HEADER;
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

const MAX_WEBHOOK_BODY: usize = 64 * 1024;

pub async fn verify_carrier_signature(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(validator) = state.signature.clone() else {
        return next.run(request).await;
    };

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_WEBHOOK_BODY).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    };

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| parts.uri.path());
    let is_form = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
    let valid = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|presented| validator.verify(path_and_query, &bytes, is_form, presented));

    if !valid {
        warn!("Rejected webhook {} with a bad or missing signature", parts.uri.path());
        return StatusCode::FORBIDDEN.into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
