//! In-memory call record store
//!
//! Same conditional-update semantics as the PostgreSQL store. Used by tests
//! and by deployments built without a database.

use crate::domain::call::{CallEvent, CallRecord, CallRecordStore, CallStatus, PersistenceError};
use crate::domain::shared::value_objects::CallId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    calls: HashMap<CallId, CallRecord>,
    events: Vec<CallEvent>,
}

#[derive(Default)]
pub struct InMemoryCallRecordStore {
    tables: RwLock<Tables>,
}

impl InMemoryCallRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CallRecordStore for InMemoryCallRecordStore {
    async fn create(&self, record: &CallRecord) -> Result<(), PersistenceError> {
        let mut tables = self.tables.write().await;
        if tables.calls.contains_key(record.id()) {
            return Err(PersistenceError::Database(format!(
                "duplicate call id {}",
                record.id()
            )));
        }
        if let Some(carrier_id) = record.carrier_call_id() {
            if tables
                .calls
                .values()
                .any(|r| r.carrier_call_id() == Some(carrier_id))
            {
                return Err(PersistenceError::Database(format!(
                    "duplicate carrier call id {}",
                    carrier_id
                )));
            }
        }
        tables.calls.insert(*record.id(), record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &CallId) -> Result<Option<CallRecord>, PersistenceError> {
        Ok(self.tables.read().await.calls.get(id).cloned())
    }

    async fn find_by_carrier_call_id(
        &self,
        carrier_call_id: &str,
    ) -> Result<Option<CallRecord>, PersistenceError> {
        Ok(self
            .tables
            .read()
            .await
            .calls
            .values()
            .find(|r| r.carrier_call_id() == Some(carrier_call_id))
            .cloned())
    }

    async fn set_carrier_call_id(
        &self,
        id: &CallId,
        carrier_call_id: &str,
    ) -> Result<(), PersistenceError> {
        let mut tables = self.tables.write().await;
        let record = tables
            .calls
            .get_mut(id)
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))?;
        record.assign_carrier_call_id(carrier_call_id);
        Ok(())
    }

    async fn update_status(
        &self,
        id: &CallId,
        status: CallStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<bool, PersistenceError> {
        let mut tables = self.tables.write().await;
        let Some(record) = tables.calls.get_mut(id) else {
            return Ok(false);
        };
        if record.is_terminal() || record.status() == status {
            return Ok(false);
        }
        *record = CallRecord::restore(
            *record.id(),
            record.carrier_call_id().map(str::to_string),
            record.direction(),
            record.from_address().to_string(),
            record.to_address().to_string(),
            record.agent_id().map(str::to_string),
            status,
            record.started_at(),
            ended_at,
        );
        Ok(true)
    }

    async fn append_event(&self, event: &CallEvent) -> Result<(), PersistenceError> {
        self.tables.write().await.events.push(event.clone());
        Ok(())
    }

    async fn list_events(&self, call_id: &CallId) -> Result<Vec<CallEvent>, PersistenceError> {
        Ok(self
            .tables
            .read()
            .await
            .events
            .iter()
            .filter(|e| &e.call_id == call_id)
            .cloned()
            .collect())
    }
}
