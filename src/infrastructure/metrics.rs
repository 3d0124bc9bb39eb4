//! Metric recording helpers
//!
//! Names are described (and the exporter installed) in
//! `interface::api::metrics_handler::init_metrics`.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

pub const CALLS_TOTAL: &str = "callbridge_calls_total";
pub const STATUS_CALLBACKS_TOTAL: &str = "callbridge_status_callbacks_total";
pub const SESSION_CONNECT_ATTEMPTS_TOTAL: &str = "callbridge_session_connect_attempts_total";
pub const SESSION_FAILURES_TOTAL: &str = "callbridge_session_failures_total";
pub const TOOL_CALLS_TOTAL: &str = "callbridge_tool_calls_total";
pub const PERSISTENCE_ERRORS_TOTAL: &str = "callbridge_persistence_errors_total";
pub const ACTIVE_SESSIONS: &str = "callbridge_active_sessions";
pub const TOOL_LATENCY_SECONDS: &str = "callbridge_tool_latency_seconds";

/// Record a call set up in either direction
pub fn record_call(direction: &str) {
    counter!(CALLS_TOTAL, "direction" => direction.to_string()).increment(1);
}

/// Record a carrier status callback by canonical status ("unrecognized" otherwise)
pub fn record_status_callback(status: &str) {
    counter!(STATUS_CALLBACKS_TOTAL, "status" => status.to_string()).increment(1);
}

pub fn record_session_connect_attempt() {
    counter!(SESSION_CONNECT_ATTEMPTS_TOTAL).increment(1);
}

pub fn record_session_failure() {
    counter!(SESSION_FAILURES_TOTAL).increment(1);
}

pub fn record_tool_call(tool: &'static str, success: bool, latency: Duration) {
    counter!(TOOL_CALLS_TOTAL, "tool" => tool, "success" => success.to_string()).increment(1);
    histogram!(TOOL_LATENCY_SECONDS, "tool" => tool).record(latency.as_secs_f64());
}

pub fn record_persistence_error(operation: &str) {
    counter!(PERSISTENCE_ERRORS_TOTAL, "operation" => operation.to_string()).increment(1);
}

pub fn session_opened() {
    gauge!(ACTIVE_SESSIONS).increment(1.0);
}

pub fn session_closed() {
    gauge!(ACTIVE_SESSIONS).decrement(1.0);
}
