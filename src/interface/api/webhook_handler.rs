//! Carrier webhook handlers

use super::dto::{
    ApiResponse, InboundCallForm, OutboundCallRequest, OutboundCallResponse, SdpAnswerResponse,
    SdpOfferRequest, StatusCallbackForm, StatusCallbackQuery,
};
use crate::application::{
    CallOrchestrator, InboundCall, OrchestratorError, OutboundCall, StatusCallback,
};
use crate::domain::call::CallRecordStore;
use crate::domain::DomainError;
use crate::infrastructure::carrier::SignatureValidator;
use crate::infrastructure::protocols::negotiate_answer;
use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const DEGRADED_HEADER: &str = "x-callbridge-degraded";

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<CallOrchestrator>,
    pub store: Arc<dyn CallRecordStore>,
    /// None when signature checks are switched off
    pub signature: Option<Arc<SignatureValidator>>,
}

/// Inbound call notification; answers with the media directive
pub async fn inbound_call(
    State(state): State<AppState>,
    Form(form): Form<InboundCallForm>,
) -> Response {
    info!("API: Inbound call {} from {} to {}", form.call_sid, form.from, form.to);

    let outcome = state
        .orchestrator
        .handle_inbound(InboundCall {
            carrier_call_id: form.call_sid,
            from: form.from,
            to: form.to,
        })
        .await;

    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml")],
        outcome.directive,
    )
        .into_response();
    if outcome.degraded {
        response
            .headers_mut()
            .insert(DEGRADED_HEADER, HeaderValue::from_static("true"));
    }
    response
}

/// Carrier status callback
pub async fn status_callback(
    State(state): State<AppState>,
    Query(query): Query<StatusCallbackQuery>,
    Form(form): Form<StatusCallbackForm>,
) -> StatusCode {
    info!("API: Status {} for {}", form.call_status, form.call_sid);

    let call_id = query.call_id.as_deref().and_then(|id| id.parse().ok());
    let outcome = state
        .orchestrator
        .handle_status(StatusCallback {
            carrier_call_id: form.call_sid,
            status: form.call_status,
            call_id,
        })
        .await;
    tracing::debug!("Status callback outcome: {:?}", outcome);

    // the carrier only needs an acknowledgement
    StatusCode::NO_CONTENT
}

/// Trigger an outbound call
pub async fn outbound_call(
    State(state): State<AppState>,
    Json(req): Json<OutboundCallRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OutboundCallResponse>>), StatusCode> {
    info!("API: Outbound call to {} (agent: {:?})", req.to, req.agent_id);

    if req.to.trim().is_empty() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("'to' must not be empty".to_string())),
        ));
    }

    match state
        .orchestrator
        .place_outbound(OutboundCall {
            to: req.to.trim().to_string(),
            agent_id: req.agent_id,
        })
        .await
    {
        Ok(placed) => Ok((
            StatusCode::CREATED,
            Json(ApiResponse::success(OutboundCallResponse {
                call_id: placed.call_id.as_uuid(),
                carrier_call_id: placed.carrier_call_id,
                degraded: placed.degraded,
            })),
        )),
        Err(OrchestratorError::Domain(DomainError::NotFound(what))) => {
            warn!("API: Outbound call rejected, unknown {}", what);
            Ok((
                StatusCode::NOT_FOUND,
                Json(ApiResponse::error(format!("Unknown {}", what))),
            ))
        }
        Err(OrchestratorError::Carrier(e)) => {
            error!("API: Carrier refused outbound call: {}", e);
            Ok((StatusCode::BAD_GATEWAY, Json(ApiResponse::error(e.to_string()))))
        }
        Err(e) => {
            error!("API: Failed to place outbound call: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Answer an SDP offer for carriers negotiating WebRTC-style media
pub async fn sdp_offer(
    Json(req): Json<SdpOfferRequest>,
) -> Result<Json<SdpAnswerResponse>, (StatusCode, Json<ApiResponse<()>>)> {
    info!("API: SDP offer for {}", req.carrier_call_id);

    match negotiate_answer(&req.sdp) {
        Ok(answer) => Ok(Json(SdpAnswerResponse {
            sdp_type: answer.sdp_type().as_str().to_string(),
            sdp: answer.to_sdp_string(),
        })),
        Err(e) => {
            warn!("API: Rejected SDP offer for {}: {}", req.carrier_call_id, e);
            Err((StatusCode::BAD_REQUEST, Json(ApiResponse::error(e.to_string()))))
        }
    }
}
