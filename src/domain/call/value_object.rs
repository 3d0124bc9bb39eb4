//! Call value objects

use serde::{Deserialize, Serialize};
use std::fmt;

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// Carrier delivered the call to us
    Inbound,
    /// We asked the carrier to place the call
    Outbound,
}

impl CallDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallDirection::Inbound => "inbound",
            CallDirection::Outbound => "outbound",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "inbound" => Some(CallDirection::Inbound),
            "outbound" => Some(CallDirection::Outbound),
            _ => None,
        }
    }
}

/// Canonical call status.
///
/// This vocabulary is shared with downstream consumers of the call records
/// and must stay stable: `queued`, `ringing`, `in-progress`, `completed`,
/// `busy`, `no-answer`, `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallStatus {
    #[serde(rename = "queued")]
    Queued,
    #[serde(rename = "ringing")]
    Ringing,
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "busy")]
    Busy,
    #[serde(rename = "no-answer")]
    NoAnswer,
    #[serde(rename = "failed")]
    Failed,
}

impl CallStatus {
    pub const ALL: [CallStatus; 7] = [
        CallStatus::Queued,
        CallStatus::Ringing,
        CallStatus::InProgress,
        CallStatus::Completed,
        CallStatus::Busy,
        CallStatus::NoAnswer,
        CallStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Queued => "queued",
            CallStatus::Ringing => "ringing",
            CallStatus::InProgress => "in-progress",
            CallStatus::Completed => "completed",
            CallStatus::Busy => "busy",
            CallStatus::NoAnswer => "no-answer",
            CallStatus::Failed => "failed",
        }
    }

    /// Parse the canonical spelling (as stored). Carrier tokens go through
    /// [`map_carrier_status`](super::status_mapper::map_carrier_status) instead.
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    /// Terminal statuses end the call; no transition leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Completed | CallStatus::Busy | CallStatus::NoAnswer | CallStatus::Failed
        )
    }

    /// Position in the lifecycle, used to drop callbacks that arrive late.
    fn progress(&self) -> u8 {
        match self {
            CallStatus::Queued => 0,
            CallStatus::Ringing => 1,
            CallStatus::InProgress => 2,
            CallStatus::Completed | CallStatus::Busy | CallStatus::NoAnswer | CallStatus::Failed => 3,
        }
    }

    /// Check if a status change is a forward move in the lifecycle
    pub fn can_transition_to(&self, next: &CallStatus) -> bool {
        !self.is_terminal() && next.progress() > self.progress()
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_status_transitions() {
        assert!(CallStatus::Queued.can_transition_to(&CallStatus::Ringing));
        assert!(CallStatus::Queued.can_transition_to(&CallStatus::InProgress));
        assert!(CallStatus::Queued.can_transition_to(&CallStatus::Failed));
        assert!(CallStatus::Ringing.can_transition_to(&CallStatus::NoAnswer));
        assert!(CallStatus::InProgress.can_transition_to(&CallStatus::Completed));
    }

    #[test]
    fn test_stale_and_terminal_transitions_rejected() {
        assert!(!CallStatus::InProgress.can_transition_to(&CallStatus::Ringing));
        assert!(!CallStatus::Ringing.can_transition_to(&CallStatus::Ringing));
        for terminal in [CallStatus::Completed, CallStatus::Busy, CallStatus::NoAnswer, CallStatus::Failed] {
            for next in CallStatus::ALL {
                assert!(!terminal.can_transition_to(&next));
            }
        }
    }

    #[test]
    fn test_canonical_spelling() {
        for status in CallStatus::ALL {
            assert_eq!(CallStatus::from_str(status.as_str()), Some(status));
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        assert_eq!(CallStatus::from_str("no_answer"), None);
    }
}
