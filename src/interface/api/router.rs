//! API Router configuration

use super::calls_handler::{get_call, get_call_events, health_check};
use super::media_stream::media_stream_handler;
use super::metrics_handler::metrics_handler;
use super::signature::verify_carrier_signature;
use super::webhook_handler::{inbound_call, outbound_call, sdp_offer, status_callback, AppState};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

/// Build the API router
pub fn build_router(state: AppState, prometheus_handle: PrometheusHandle) -> Router {
    let health_routes = Router::new().route("/health", get(health_check));

    // Carrier webhooks, all behind the signature check
    let webhook_routes = Router::new()
        .route("/webhooks/inbound", post(inbound_call))
        .route("/webhooks/status", post(status_callback))
        .route("/webhooks/outbound", post(outbound_call))
        .route("/webhooks/sdp", post(sdp_offer))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            verify_carrier_signature,
        ));

    let call_routes = Router::new()
        .route("/calls/:id", get(get_call))
        .route("/calls/:id/events", get(get_call_events));

    let stream_routes = Router::new().route("/media-stream", get(media_stream_handler));

    // Metrics route (separate state)
    let metrics_routes = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(prometheus_handle);

    Router::new()
        .merge(health_routes)
        .merge(webhook_routes)
        .merge(call_routes)
        .merge(stream_routes)
        .with_state(state)
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
}
