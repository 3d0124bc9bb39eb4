//! Call events
//!
//! Append-only audit trail for a call. Rows are immutable once written.

use crate::domain::shared::value_objects::CallId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallEventType {
    Start,
    Stop,
    Transcript,
    ToolCall,
    ToolResult,
    Error,
}

impl CallEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallEventType::Start => "start",
            CallEventType::Stop => "stop",
            CallEventType::Transcript => "transcript",
            CallEventType::ToolCall => "tool_call",
            CallEventType::ToolResult => "tool_result",
            CallEventType::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "start" => Some(CallEventType::Start),
            "stop" => Some(CallEventType::Stop),
            "transcript" => Some(CallEventType::Transcript),
            "tool_call" => Some(CallEventType::ToolCall),
            "tool_result" => Some(CallEventType::ToolResult),
            "error" => Some(CallEventType::Error),
            _ => None,
        }
    }
}

/// Who spoke a transcript line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    Caller,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEvent {
    pub id: Uuid,
    pub call_id: CallId,
    pub event_type: CallEventType,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl CallEvent {
    pub fn new(call_id: CallId, event_type: CallEventType, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            call_id,
            event_type,
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn start(call_id: CallId, session_id: &str, stream_id: Option<&str>) -> Self {
        Self::new(
            call_id,
            CallEventType::Start,
            json!({ "session_id": session_id, "stream_id": stream_id }),
        )
    }

    pub fn stop(call_id: CallId, reason: &str) -> Self {
        Self::new(call_id, CallEventType::Stop, json!({ "reason": reason }))
    }

    pub fn transcript(call_id: CallId, role: TranscriptRole, text: &str) -> Self {
        Self::new(
            call_id,
            CallEventType::Transcript,
            json!({ "role": role, "text": text }),
        )
    }

    pub fn tool_call(call_id: CallId, correlation_id: &str, tool_name: &str, arguments: Value) -> Self {
        Self::new(
            call_id,
            CallEventType::ToolCall,
            json!({
                "correlation_id": correlation_id,
                "tool_name": tool_name,
                "arguments": arguments,
            }),
        )
    }

    pub fn tool_result(
        call_id: CallId,
        correlation_id: &str,
        tool_name: &str,
        outcome: Value,
        latency_ms: u64,
    ) -> Self {
        Self::new(
            call_id,
            CallEventType::ToolResult,
            json!({
                "correlation_id": correlation_id,
                "tool_name": tool_name,
                "result": outcome,
                "latency_ms": latency_ms,
            }),
        )
    }

    pub fn error(call_id: CallId, kind: &str, message: &str) -> Self {
        Self::new(
            call_id,
            CallEventType::Error,
            json!({ "kind": kind, "message": message }),
        )
    }
}
