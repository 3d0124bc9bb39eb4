//! Read-only call queries and health

use super::dto::{ApiResponse, CallEventResponse, CallRecordResponse, HealthResponse};
use super::webhook_handler::AppState;
use crate::domain::shared::value_objects::CallId;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::{error, info};

pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::success(HealthResponse {
        status: "ok".to_string(),
        active_calls: state.orchestrator.active_calls().await,
    }))
}

fn parse_call_id(raw: &str) -> Result<CallId, (StatusCode, String)> {
    raw.parse::<CallId>()
        .map_err(|_| (StatusCode::BAD_REQUEST, format!("Invalid call id {}", raw)))
}

/// Get a call record
pub async fn get_call(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<ApiResponse<CallRecordResponse>>) {
    info!("API: Getting call {}", id);

    let call_id = match parse_call_id(&id) {
        Ok(call_id) => call_id,
        Err((status, message)) => return (status, Json(ApiResponse::error(message))),
    };

    match state.store.find_by_id(&call_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(ApiResponse::success(record.into()))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Call {} not found", id))),
        ),
        Err(e) => {
            error!("API: Failed to get call: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::error(e.to_string())),
            )
        }
    }
}

/// Get a call's event log in insertion order
pub async fn get_call_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<ApiResponse<Vec<CallEventResponse>>>) {
    info!("API: Getting events of call {}", id);

    let call_id = match parse_call_id(&id) {
        Ok(call_id) => call_id,
        Err((status, message)) => return (status, Json(ApiResponse::error(message))),
    };

    match state.store.list_events(&call_id).await {
        Ok(events) => (
            StatusCode::OK,
            Json(ApiResponse::success(
                events.into_iter().map(CallEventResponse::from).collect(),
            )),
        ),
        Err(e) => {
            error!("API: Failed to list call events: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::error(e.to_string())),
            )
        }
    }
}
