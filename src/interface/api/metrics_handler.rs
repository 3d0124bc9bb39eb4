//! Prometheus metrics handler

use crate::infrastructure::metrics::{
    ACTIVE_SESSIONS, CALLS_TOTAL, PERSISTENCE_ERRORS_TOTAL, SESSION_CONNECT_ATTEMPTS_TOTAL,
    SESSION_FAILURES_TOTAL, STATUS_CALLBACKS_TOTAL, TOOL_CALLS_TOTAL, TOOL_LATENCY_SECONDS,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and describe every callbridge metric
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(TOOL_LATENCY_SECONDS.to_string()),
            &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 8.0, 10.0],
        )?
        .install_recorder()?;

    describe_counter!(CALLS_TOTAL, "Calls set up, by direction");
    describe_counter!(
        STATUS_CALLBACKS_TOTAL,
        "Carrier status callbacks received, by canonical status"
    );
    describe_counter!(
        SESSION_CONNECT_ATTEMPTS_TOTAL,
        "Connect attempts to the realtime model endpoint"
    );
    describe_counter!(
        SESSION_FAILURES_TOTAL,
        "Realtime sessions that could not be established"
    );
    describe_counter!(TOOL_CALLS_TOTAL, "Tool calls dispatched, by tool and outcome");
    describe_counter!(
        PERSISTENCE_ERRORS_TOTAL,
        "Call store operations that failed or timed out"
    );
    describe_gauge!(ACTIVE_SESSIONS, "Realtime sessions currently open");
    describe_histogram!(
        TOOL_LATENCY_SECONDS,
        Unit::Seconds,
        "Tool call latency including retries"
    );

    Ok(handle)
}

pub async fn metrics_handler(State(prometheus_handle): State<PrometheusHandle>) -> Response {
    (StatusCode::OK, prometheus_handle.render()).into_response()
}
