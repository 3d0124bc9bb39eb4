//! Live realtime session and its channel

use crate::domain::shared::value_objects::{CallId, SessionId};
use crate::infrastructure::realtime::protocol::{ClientEvent, ServerEvent, SessionConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RealtimeError {
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Handshake rejected: {0}")]
    Rejected(String),
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
    #[error("Session closed")]
    Closed,
    #[error("Session creation gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
    #[error("Session creation cancelled")]
    Cancelled,
}

impl RealtimeError {
    /// Timeouts and transport failures are worth another connect attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, RealtimeError::ConnectTimeout(_) | RealtimeError::Transport(_))
    }
}

pub type FrameSink = Pin<Box<dyn Sink<String, Error = RealtimeError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, RealtimeError>> + Send>>;

/// Raw text channel to the model
pub struct SessionChannel {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens raw channels to the model endpoint
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self) -> Result<SessionChannel, RealtimeError>;
}

/// Cloneable sending half of a session.
///
/// Every frame goes through one lock, so audio relay and concurrent tool
/// results never interleave partial writes.
#[derive(Clone)]
pub struct SessionSender {
    sink: Arc<Mutex<FrameSink>>,
    closed: Arc<AtomicBool>,
}

impl SessionSender {
    fn new(sink: FrameSink) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn send(&self, event: &ClientEvent) -> Result<(), RealtimeError> {
        if self.is_closed() {
            return Err(RealtimeError::Closed);
        }
        let text = event
            .to_json()
            .map_err(|e| RealtimeError::InvalidFrame(e.to_string()))?;
        let mut sink = self.sink.lock().await;
        sink.send(text).await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Best-effort close; only the first call touches the channel
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            debug!("Ignoring error while closing realtime channel: {}", e);
        }
        true
    }
}

/// A configured session bound to one call. Never persisted.
pub struct RealtimeSession {
    id: SessionId,
    call_id: CallId,
    correlation_id: String,
    config: SessionConfig,
    created_at: DateTime<Utc>,
    sender: SessionSender,
    // Only polled through `&mut self`; the lock keeps the session `Sync`
    events: Mutex<FrameStream>,
}

impl RealtimeSession {
    pub(crate) fn new(
        call_id: CallId,
        correlation_id: String,
        config: SessionConfig,
        channel: SessionChannel,
    ) -> Self {
        Self {
            id: SessionId::new(),
            call_id,
            correlation_id,
            config,
            created_at: Utc::now(),
            sender: SessionSender::new(channel.sink),
            events: Mutex::new(channel.stream),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn sender(&self) -> SessionSender {
        self.sender.clone()
    }

    pub async fn send(&self, event: &ClientEvent) -> Result<(), RealtimeError> {
        self.sender.send(event).await
    }

    /// Next server event; `None` once the model side has closed.
    /// Frames that are not JSON are skipped.
    pub async fn next_event(&mut self) -> Option<Result<ServerEvent, RealtimeError>> {
        let events = self.events.get_mut();
        loop {
            match events.next().await? {
                Ok(text) => match ServerEvent::parse(&text) {
                    Ok(event) => return Some(Ok(event)),
                    Err(e) => debug!("Skipping non-JSON realtime frame: {}", e),
                },
                Err(e) => return Some(Err(e)),
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Idempotent; returns true only for the call that actually closed it
    pub async fn close(&self) -> bool {
        self.sender.close().await
    }
}
