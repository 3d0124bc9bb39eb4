//! Call record aggregate root

use crate::domain::call::value_object::{CallDirection, CallStatus};
use crate::domain::shared::value_objects::CallId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of applying a mapped carrier status to a call record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// Status moved forward
    Applied { from: CallStatus, to: CallStatus },
    /// Requested status equals the current one
    Unchanged,
    /// Callback arrived after a later status was already recorded
    Stale { current: CallStatus, requested: CallStatus },
    /// Record is terminal; terminal statuses are immutable
    Terminal { current: CallStatus, requested: CallStatus },
}

impl StatusChange {
    pub fn is_applied(&self) -> bool {
        matches!(self, StatusChange::Applied { .. })
    }
}

/// Call record aggregate root
///
/// One record per carrier call leg. Invariant: `ended_at` is set if and only
/// if `status` is terminal, and a terminal status never changes again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    id: CallId,
    carrier_call_id: Option<String>,
    direction: CallDirection,
    from_address: String,
    to_address: String,
    agent_id: Option<String>,
    status: CallStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl CallRecord {
    /// Record for a call the carrier delivered to us. The carrier only
    /// notifies us once the leg is up, so the record starts `in-progress`.
    pub fn inbound(
        carrier_call_id: impl Into<String>,
        from_address: impl Into<String>,
        to_address: impl Into<String>,
        agent_id: Option<String>,
    ) -> Self {
        Self {
            id: CallId::new(),
            carrier_call_id: Some(carrier_call_id.into()),
            direction: CallDirection::Inbound,
            from_address: from_address.into(),
            to_address: to_address.into(),
            agent_id,
            status: CallStatus::InProgress,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Record for a call we are about to ask the carrier to place
    pub fn outbound(
        from_address: impl Into<String>,
        to_address: impl Into<String>,
        agent_id: Option<String>,
    ) -> Self {
        Self {
            id: CallId::new(),
            carrier_call_id: None,
            direction: CallDirection::Outbound,
            from_address: from_address.into(),
            to_address: to_address.into(),
            agent_id,
            status: CallStatus::Queued,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Rebuild a record from storage
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: CallId,
        carrier_call_id: Option<String>,
        direction: CallDirection,
        from_address: String,
        to_address: String,
        agent_id: Option<String>,
        status: CallStatus,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            carrier_call_id,
            direction,
            from_address,
            to_address,
            agent_id,
            status,
            started_at,
            ended_at,
        }
    }

    /// Apply a canonical status reported by the carrier.
    pub fn apply_status(&mut self, next: CallStatus, at: DateTime<Utc>) -> StatusChange {
        if self.status == next {
            return StatusChange::Unchanged;
        }
        if self.status.is_terminal() {
            return StatusChange::Terminal {
                current: self.status,
                requested: next,
            };
        }
        if !self.status.can_transition_to(&next) {
            return StatusChange::Stale {
                current: self.status,
                requested: next,
            };
        }

        let from = self.status;
        self.status = next;
        if next.is_terminal() {
            self.ended_at = Some(at);
        }
        StatusChange::Applied { from, to: next }
    }

    pub fn assign_carrier_call_id(&mut self, carrier_call_id: impl Into<String>) {
        self.carrier_call_id = Some(carrier_call_id.into());
    }

    // Getters
    pub fn id(&self) -> &CallId {
        &self.id
    }

    pub fn carrier_call_id(&self) -> Option<&str> {
        self.carrier_call_id.as_deref()
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn from_address(&self) -> &str {
        &self.from_address
    }

    pub fn to_address(&self) -> &str {
        &self.to_address
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
