//! Call record store interface

use crate::domain::call::aggregate::CallRecord;
use crate::domain::call::event::CallEvent;
use crate::domain::call::value_object::CallStatus;
use crate::domain::shared::value_objects::CallId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Call record not found: {0}")]
    NotFound(String),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
    #[error("Persistence operation timed out")]
    Timeout,
}

/// Persistence gateway for call records and their event log.
///
/// Defined in the domain layer as a port; adapters live in
/// `infrastructure::persistence`. External consumers read call data only
/// through this gateway.
#[async_trait]
pub trait CallRecordStore: Send + Sync {
    /// Insert a new call record
    async fn create(&self, record: &CallRecord) -> Result<(), PersistenceError>;

    async fn find_by_id(&self, id: &CallId) -> Result<Option<CallRecord>, PersistenceError>;

    /// Look up a record by the carrier's correlation key
    async fn find_by_carrier_call_id(
        &self,
        carrier_call_id: &str,
    ) -> Result<Option<CallRecord>, PersistenceError>;

    async fn set_carrier_call_id(
        &self,
        id: &CallId,
        carrier_call_id: &str,
    ) -> Result<(), PersistenceError>;

    /// Conditionally update a record's status.
    ///
    /// Never overwrites a terminal row. `ended_at` is written together with a
    /// terminal status. Returns whether a row changed.
    async fn update_status(
        &self,
        id: &CallId,
        status: CallStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<bool, PersistenceError>;

    /// Append an immutable event row
    async fn append_event(&self, event: &CallEvent) -> Result<(), PersistenceError>;

    /// Events of a call in insertion order
    async fn list_events(&self, call_id: &CallId) -> Result<Vec<CallEvent>, PersistenceError>;
}
