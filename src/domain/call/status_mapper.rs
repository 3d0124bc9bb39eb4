//! Carrier status vocabulary mapping
//!
//! The carrier reports call progress with its own tokens. The table below is
//! a stability contract: downstream consumers rely on these canonical values.
//!
//! | carrier token                            | canonical     |
//! |------------------------------------------|---------------|
//! | `initiated`, `queued`                    | `queued`      |
//! | `ringing`                                | `ringing`     |
//! | `answered`, `in-progress`, `in_progress` | `in-progress` |
//! | `completed`                              | `completed`   |
//! | `busy`                                   | `busy`        |
//! | `no-answer`, `no_answer`, `noanswer`     | `no-answer`   |
//! | `failed`                                 | `failed`      |
//!
//! Matching is case-insensitive and ignores surrounding whitespace.

use crate::domain::call::value_object::CallStatus;

/// Result of mapping a carrier status token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CarrierStatus {
    Recognized(CallStatus),
    Unrecognized(String),
}

impl CarrierStatus {
    pub fn status(&self) -> Option<CallStatus> {
        match self {
            CarrierStatus::Recognized(status) => Some(*status),
            CarrierStatus::Unrecognized(_) => None,
        }
    }
}

/// Map a carrier status token to the canonical vocabulary. Never fails.
pub fn map_carrier_status(token: &str) -> CarrierStatus {
    let normalized = token.trim().to_ascii_lowercase();
    let status = match normalized.as_str() {
        "initiated" | "queued" => CallStatus::Queued,
        "ringing" => CallStatus::Ringing,
        "answered" | "in-progress" | "in_progress" => CallStatus::InProgress,
        "completed" => CallStatus::Completed,
        "busy" => CallStatus::Busy,
        "no-answer" | "no_answer" | "noanswer" => CallStatus::NoAnswer,
        "failed" => CallStatus::Failed,
        _ => return CarrierStatus::Unrecognized(token.to_string()),
    };
    CarrierStatus::Recognized(status)
}
