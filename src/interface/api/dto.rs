//! Request and response schemas for the HTTP surface

use crate::domain::call::{CallEvent, CallRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Generic API response envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Carrier inbound-call notification (form encoded)
#[derive(Debug, Deserialize)]
pub struct InboundCallForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: String,
}

/// Carrier status callback (form encoded)
#[derive(Debug, Deserialize)]
pub struct StatusCallbackForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "CallStatus")]
    pub call_status: String,
}

/// Query string we put on outbound status-callback URLs
#[derive(Debug, Default, Deserialize)]
pub struct StatusCallbackQuery {
    #[serde(rename = "callId")]
    pub call_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OutboundCallRequest {
    pub to: String,
    #[serde(default)]
    pub agent_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OutboundCallResponse {
    pub call_id: Uuid,
    pub carrier_call_id: String,
    pub degraded: bool,
}

#[derive(Debug, Deserialize)]
pub struct SdpOfferRequest {
    pub carrier_call_id: String,
    pub sdp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SdpAnswerResponse {
    pub sdp_type: String,
    pub sdp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallRecordResponse {
    pub id: Uuid,
    pub carrier_call_id: Option<String>,
    pub direction: String,
    pub from_address: String,
    pub to_address: String,
    pub agent_id: Option<String>,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<CallRecord> for CallRecordResponse {
    fn from(record: CallRecord) -> Self {
        CallRecordResponse {
            id: record.id().as_uuid(),
            carrier_call_id: record.carrier_call_id().map(str::to_string),
            direction: record.direction().as_str().to_string(),
            from_address: record.from_address().to_string(),
            to_address: record.to_address().to_string(),
            agent_id: record.agent_id().map(str::to_string),
            status: record.status().as_str().to_string(),
            started_at: record.started_at(),
            ended_at: record.ended_at(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallEventResponse {
    pub id: Uuid,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl From<CallEvent> for CallEventResponse {
    fn from(event: CallEvent) -> Self {
        CallEventResponse {
            id: event.id,
            event_type: event.event_type.as_str().to_string(),
            payload: event.payload,
            created_at: event.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_calls: usize,
}
