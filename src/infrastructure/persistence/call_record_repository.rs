//! PostgreSQL implementation of the call record store

use crate::domain::call::{
    CallDirection, CallEvent, CallEventType, CallRecord, CallRecordStore, CallStatus,
    PersistenceError,
};
use crate::domain::shared::value_objects::CallId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{debug, error};
use uuid::Uuid;

const TERMINAL_STATUSES: &str = "('completed', 'busy', 'no-answer', 'failed')";

#[derive(FromRow)]
struct CallRow {
    id: Uuid,
    carrier_call_id: Option<String>,
    direction: String,
    from_address: String,
    to_address: String,
    agent_id: Option<String>,
    status: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl TryFrom<CallRow> for CallRecord {
    type Error = PersistenceError;

    fn try_from(r: CallRow) -> Result<Self, Self::Error> {
        let direction = CallDirection::from_str(&r.direction)
            .ok_or_else(|| PersistenceError::Corrupt(format!("direction {}", r.direction)))?;
        let status = CallStatus::from_str(&r.status)
            .ok_or_else(|| PersistenceError::Corrupt(format!("status {}", r.status)))?;
        Ok(CallRecord::restore(
            CallId::from_uuid(r.id),
            r.carrier_call_id,
            direction,
            r.from_address,
            r.to_address,
            r.agent_id,
            status,
            r.started_at,
            r.ended_at,
        ))
    }
}

#[derive(FromRow)]
struct EventRow {
    id: Uuid,
    call_id: Uuid,
    event_type: String,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for CallEvent {
    type Error = PersistenceError;

    fn try_from(r: EventRow) -> Result<Self, Self::Error> {
        let event_type = CallEventType::from_str(&r.event_type)
            .ok_or_else(|| PersistenceError::Corrupt(format!("event_type {}", r.event_type)))?;
        Ok(CallEvent {
            id: r.id,
            call_id: CallId::from_uuid(r.call_id),
            event_type,
            payload: r.payload,
            created_at: r.created_at,
        })
    }
}

fn db_error(context: &str, e: sqlx::Error) -> PersistenceError {
    error!("Failed to {}: {}", context, e);
    PersistenceError::Database(e.to_string())
}

pub struct PgCallRecordStore {
    pool: PgPool,
}

impl PgCallRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CallRecordStore for PgCallRecordStore {
    async fn create(&self, record: &CallRecord) -> Result<(), PersistenceError> {
        debug!("Creating call record {}", record.id());

        sqlx::query(
            r#"
            INSERT INTO voice_calls (
                id, carrier_call_id, direction, from_address, to_address,
                agent_id, status, started_at, ended_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id().as_uuid())
        .bind(record.carrier_call_id())
        .bind(record.direction().as_str())
        .bind(record.from_address())
        .bind(record.to_address())
        .bind(record.agent_id())
        .bind(record.status().as_str())
        .bind(record.started_at())
        .bind(record.ended_at())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("create call record", e))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &CallId) -> Result<Option<CallRecord>, PersistenceError> {
        let row = sqlx::query_as::<_, CallRow>(
            r#"
            SELECT id, carrier_call_id, direction, from_address, to_address,
                   agent_id, status, started_at, ended_at
            FROM voice_calls
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find call record", e))?;

        row.map(CallRecord::try_from).transpose()
    }

    async fn find_by_carrier_call_id(
        &self,
        carrier_call_id: &str,
    ) -> Result<Option<CallRecord>, PersistenceError> {
        let row = sqlx::query_as::<_, CallRow>(
            r#"
            SELECT id, carrier_call_id, direction, from_address, to_address,
                   agent_id, status, started_at, ended_at
            FROM voice_calls
            WHERE carrier_call_id = $1
            "#,
        )
        .bind(carrier_call_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find call record by carrier id", e))?;

        row.map(CallRecord::try_from).transpose()
    }

    async fn set_carrier_call_id(
        &self,
        id: &CallId,
        carrier_call_id: &str,
    ) -> Result<(), PersistenceError> {
        let result = sqlx::query(
            "UPDATE voice_calls SET carrier_call_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(carrier_call_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("set carrier call id", e))?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn update_status(
        &self,
        id: &CallId,
        status: CallStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<bool, PersistenceError> {
        // Terminal rows are never touched again
        let sql = format!(
            r#"
            UPDATE voice_calls
            SET status = $2, ended_at = $3, updated_at = NOW()
            WHERE id = $1 AND status NOT IN {TERMINAL_STATUSES} AND status <> $2
            "#
        );
        let result = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(status.as_str())
            .bind(ended_at)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("update call status", e))?;

        debug!(
            "Status update for call {} to {}: {} row(s)",
            id,
            status,
            result.rows_affected()
        );
        Ok(result.rows_affected() > 0)
    }

    async fn append_event(&self, event: &CallEvent) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO voice_events (id, call_id, event_type, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.id)
        .bind(event.call_id.as_uuid())
        .bind(event.event_type.as_str())
        .bind(&event.payload)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("append call event", e))?;

        Ok(())
    }

    async fn list_events(&self, call_id: &CallId) -> Result<Vec<CallEvent>, PersistenceError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, call_id, event_type, payload, created_at
            FROM voice_events
            WHERE call_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(call_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list call events", e))?;

        rows.into_iter().map(CallEvent::try_from).collect()
    }
}
