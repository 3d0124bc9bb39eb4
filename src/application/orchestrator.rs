//! Call orchestrator
//!
//! Owns the lifecycle of every call: record creation on inbound and outbound
//! setup, status callbacks, and the per-call media task that creates the
//! realtime session and runs the bridge. Each live call is registered with
//! its own cancellation token; a terminal status fires it, which stops the
//! bridge, cancels in-flight tool calls, and aborts pending session retries.

use crate::application::bridge::{append, BridgeExit, CallContext, MediaBridge};
use crate::application::tool_dispatch::ToolDispatcher;
use crate::domain::agent::{AgentDirectory, ResolvedAgent};
use crate::domain::call::{
    map_carrier_status, CallEvent, CallRecord, CallRecordStore, CallStatus, CarrierStatus,
    PersistenceError, StatusChange,
};
use crate::domain::shared::value_objects::CallId;
use crate::domain::DomainError;
use crate::infrastructure::carrier::{
    CarrierClient, CarrierError, CarrierFrame, MediaDirective, OutboundFrame, PlaceCallRequest,
    StreamStart,
};
use crate::infrastructure::metrics;
use crate::infrastructure::realtime::{RealtimeError, SessionFactory, SessionRequest};
use chrono::Utc;
use futures::Stream;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Correlation tags carried in the media directive
pub const CALL_ID_PARAMETER: &str = "callId";
pub const CARRIER_CALL_ID_PARAMETER: &str = "carrierCallId";
pub const AGENT_ID_PARAMETER: &str = "agentId";

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("Carrier rejected call placement: {0}")]
    Carrier(#[from] CarrierError),
    #[error("Realtime session failed: {0}")]
    Session(#[from] RealtimeError),
    #[error("Unknown call: {0}")]
    UnknownCall(String),
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub media_relay_url: String,
    /// Caller id presented on outbound calls
    pub caller_id: String,
    pub status_callback_url: String,
    pub keep_open_seconds: u32,
    /// Deadline for store writes on the webhook path
    pub persistence_timeout: Duration,
    /// A registered call whose media stream has not started by then is released
    pub stream_start_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCall {
    pub carrier_call_id: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundResponse {
    pub call_id: CallId,
    /// Markup returned to the carrier
    pub directive: String,
    /// The call record could not be persisted
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCall {
    pub to: String,
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundResponse {
    pub call_id: CallId,
    pub carrier_call_id: String,
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCallback {
    pub carrier_call_id: String,
    pub status: String,
    /// Our call id when the callback URL carried it
    pub call_id: Option<CallId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdateOutcome {
    Applied { from: CallStatus, to: CallStatus },
    /// Same status again, a stale update, or a record already terminal
    Ignored(StatusChange),
    Unrecognized(String),
    UnknownCall,
    /// Store unavailable; the update was dropped
    Unavailable,
}

/// Per-call state held while a call is live
#[derive(Debug, Clone)]
struct ActiveCall {
    cancel: CancellationToken,
    carrier_call_id: Option<String>,
    from_address: String,
    agent: ResolvedAgent,
    streaming: bool,
}

type Registry = Arc<RwLock<HashMap<CallId, ActiveCall>>>;

pub struct CallOrchestrator {
    store: Arc<dyn CallRecordStore>,
    sessions: Arc<dyn SessionFactory>,
    carrier: Arc<dyn CarrierClient>,
    agents: AgentDirectory,
    bridge: MediaBridge,
    config: OrchestratorConfig,
    active: Registry,
}

impl CallOrchestrator {
    pub fn new(
        store: Arc<dyn CallRecordStore>,
        sessions: Arc<dyn SessionFactory>,
        carrier: Arc<dyn CarrierClient>,
        agents: AgentDirectory,
        dispatcher: Arc<ToolDispatcher>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            bridge: MediaBridge::new(store.clone(), dispatcher),
            store,
            sessions,
            carrier,
            agents,
            config,
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<dyn CallRecordStore> {
        &self.store
    }

    pub async fn active_calls(&self) -> usize {
        self.active.read().await.len()
    }

    /// Answer an inbound call notification.
    ///
    /// Never fails: if the record cannot be written in time the directive is
    /// still returned and the response is flagged degraded. No model session
    /// is opened here; that waits for the carrier's media stream. A repeated
    /// notification for the same carrier call answers with the existing call.
    pub async fn handle_inbound(&self, call: InboundCall) -> InboundResponse {
        if let Some(response) = self.existing_inbound(&call).await {
            return response;
        }

        let agent = self.agents.resolve_for_callee(&call.to);
        let record = CallRecord::inbound(
            call.carrier_call_id.clone(),
            call.from.clone(),
            call.to.clone(),
            agent.agent_id.clone(),
        );
        let call_id = *record.id();
        metrics::record_call("inbound");

        let degraded = self
            .persist("create", self.store.create(&record))
            .await
            .is_none();
        if degraded {
            warn!(
                "Inbound call {} ({}) not persisted, answering degraded",
                call_id, call.carrier_call_id
            );
        }

        let directive = self.directive(call_id, Some(&call.carrier_call_id), &agent);
        self.register(
            call_id,
            ActiveCall {
                cancel: CancellationToken::new(),
                carrier_call_id: Some(call.carrier_call_id.clone()),
                from_address: call.from,
                agent,
                streaming: false,
            },
        )
        .await;

        info!(
            "Inbound call {} ({}) to {} accepted",
            call_id, call.carrier_call_id, call.to
        );
        InboundResponse {
            call_id,
            directive,
            degraded,
        }
    }

    /// Ask the carrier to place a call.
    ///
    /// An unknown agent override is rejected before anything is written.
    /// If the carrier refuses, the record is marked failed.
    pub async fn place_outbound(
        &self,
        call: OutboundCall,
    ) -> Result<OutboundResponse, OrchestratorError> {
        let agent = match &call.agent_id {
            Some(id) => self.agents.resolve_override(id)?,
            None => self.agents.resolve_for_callee(&self.config.caller_id),
        };

        let record = CallRecord::outbound(
            self.config.caller_id.clone(),
            call.to.clone(),
            agent.agent_id.clone(),
        );
        let call_id = *record.id();
        metrics::record_call("outbound");

        let mut degraded = self
            .persist("create", self.store.create(&record))
            .await
            .is_none();

        self.register(
            call_id,
            ActiveCall {
                cancel: CancellationToken::new(),
                carrier_call_id: None,
                from_address: self.config.caller_id.clone(),
                agent: agent.clone(),
                streaming: false,
            },
        )
        .await;

        let request = PlaceCallRequest {
            to: call.to.clone(),
            from: self.config.caller_id.clone(),
            directive: self.directive(call_id, None, &agent),
            status_callback_url: format!(
                "{}?{}={}",
                self.config.status_callback_url, CALL_ID_PARAMETER, call_id
            ),
        };

        let carrier_call_id = match self.carrier.place_call(&request).await {
            Ok(sid) => sid,
            Err(e) => {
                error!("Carrier refused outbound call {} to {}: {}", call_id, call.to, e);
                self.mark_failed(call_id, "carrier", &e.to_string()).await;
                self.end_call(&call_id).await;
                return Err(e.into());
            }
        };

        if let Some(active) = self.active.write().await.get_mut(&call_id) {
            active.carrier_call_id = Some(carrier_call_id.clone());
        }
        if !degraded
            && self
                .persist(
                    "set_carrier_call_id",
                    self.store.set_carrier_call_id(&call_id, &carrier_call_id),
                )
                .await
                .is_none()
        {
            degraded = true;
        }

        info!(
            "Outbound call {} ({}) to {} placed",
            call_id, carrier_call_id, call.to
        );
        Ok(OutboundResponse {
            call_id,
            carrier_call_id,
            degraded,
        })
    }

    /// Apply a carrier status callback.
    ///
    /// Idempotent and order-tolerant: repeats, stale updates, and attempts
    /// to leave a terminal state are ignored. Store failures are logged and
    /// never surface to the caller.
    pub async fn handle_status(&self, callback: StatusCallback) -> StatusUpdateOutcome {
        let status = match map_carrier_status(&callback.status) {
            CarrierStatus::Recognized(status) => status,
            CarrierStatus::Unrecognized(token) => {
                metrics::record_status_callback("unrecognized");
                warn!(
                    "Ignoring unrecognized status {:?} for {}",
                    token, callback.carrier_call_id
                );
                return StatusUpdateOutcome::Unrecognized(token);
            }
        };
        metrics::record_status_callback(status.as_str());

        let Some(mut record) = self.lookup(&callback).await else {
            // the live task still needs stopping even when the store is down
            if status.is_terminal() {
                self.end_unresolved(&callback).await;
            }
            return StatusUpdateOutcome::Unavailable;
        };
        let Some(record) = record.as_mut() else {
            warn!("Status {} for unknown call {}", status, callback.carrier_call_id);
            if status.is_terminal() {
                self.end_unresolved(&callback).await;
            }
            return StatusUpdateOutcome::UnknownCall;
        };
        let call_id = *record.id();

        let change = record.apply_status(status, Utc::now());
        let outcome = match change {
            StatusChange::Applied { from, to } => {
                let write = self.store.update_status(&call_id, to, record.ended_at());
                match self.persist("update_status", write).await {
                    Some(true) => info!("Call {} status {} -> {}", call_id, from, to),
                    Some(false) => debug!("Call {} status {} already settled", call_id, to),
                    None => {}
                }
                StatusUpdateOutcome::Applied { from, to }
            }
            other => {
                debug!("Call {} ignoring status {}: {:?}", call_id, status, other);
                StatusUpdateOutcome::Ignored(other)
            }
        };

        if status.is_terminal() {
            self.end_call(&call_id).await;
        }
        outcome
    }

    /// Serve one carrier media stream.
    ///
    /// `start` is the stream's start frame. The realtime session is created
    /// here, off the webhook path; a session that cannot be created, or dies
    /// mid-call, fails the call and hangs up the carrier leg.
    pub async fn run_media_stream<S>(
        &self,
        start: StreamStart,
        carrier_in: S,
        carrier_out: UnboundedSender<OutboundFrame>,
    ) -> Result<BridgeExit, OrchestratorError>
    where
        S: Stream<Item = CarrierFrame> + Unpin,
    {
        let call_id = start
            .parameter(CALL_ID_PARAMETER)
            .and_then(|id| id.parse::<CallId>().ok())
            .ok_or_else(|| {
                OrchestratorError::UnknownCall(format!("stream {} without call id", start.stream_sid))
            })?;
        let active = self.resume(&call_id, &start).await?;
        let carrier_call_id = active
            .carrier_call_id
            .clone()
            .or_else(|| start.call_sid.clone())
            .unwrap_or_default();

        let request = SessionRequest::for_agent(call_id, carrier_call_id.clone(), &active.agent);
        let mut session = match self.sessions.create(&request, &active.cancel).await {
            Ok(session) => session,
            Err(RealtimeError::Cancelled) => {
                info!("Call {} ended before its session was ready", call_id);
                self.end_call(&call_id).await;
                return Ok(BridgeExit::Cancelled);
            }
            Err(e) => {
                self.fail_call(call_id, &carrier_call_id, "session", &e.to_string())
                    .await;
                return Err(e.into());
            }
        };

        append(
            &*self.store,
            &CallEvent::start(call_id, &session.id().to_string(), Some(&start.stream_sid)),
        )
        .await;

        let context = CallContext {
            call_id,
            carrier_call_id: carrier_call_id.clone(),
            from_address: active.from_address.clone(),
            agent_id: active.agent.agent_id.clone(),
            stream_sid: start.stream_sid.clone(),
        };
        let exit = self
            .bridge
            .run(&context, &mut session, carrier_in, carrier_out, &active.cancel)
            .await;

        self.sessions.close(&session).await;
        append(&*self.store, &CallEvent::stop(call_id, exit.as_str())).await;

        if let BridgeExit::ModelFailed(reason) = &exit {
            self.fail_call(call_id, &carrier_call_id, "session", reason).await;
        } else if exit == BridgeExit::ModelClosed {
            self.fail_call(call_id, &carrier_call_id, "session", "model closed the session")
                .await;
        } else {
            self.end_call(&call_id).await;
        }
        Ok(exit)
    }

    /// Existing call for a repeated inbound notification
    async fn existing_inbound(&self, call: &InboundCall) -> Option<InboundResponse> {
        let live = self
            .active
            .read()
            .await
            .iter()
            .find(|(_, active)| {
                active.carrier_call_id.as_deref() == Some(call.carrier_call_id.as_str())
            })
            .map(|(call_id, active)| (*call_id, active.agent.clone()));

        let (call_id, agent) = match live {
            Some(found) => found,
            None => {
                let record = self
                    .persist(
                        "find_by_carrier_call_id",
                        self.store.find_by_carrier_call_id(&call.carrier_call_id),
                    )
                    .await
                    .flatten()?;
                let agent = match record.agent_id() {
                    Some(id) => self
                        .agents
                        .resolve_override(id)
                        .unwrap_or_else(|_| self.agents.resolve_for_callee(record.to_address())),
                    None => self.agents.resolve_for_callee(record.to_address()),
                };
                if !record.is_terminal() {
                    self.register(
                        *record.id(),
                        ActiveCall {
                            cancel: CancellationToken::new(),
                            carrier_call_id: Some(call.carrier_call_id.clone()),
                            from_address: record.from_address().to_string(),
                            agent: agent.clone(),
                            streaming: false,
                        },
                    )
                    .await;
                }
                (*record.id(), agent)
            }
        };

        info!(
            "Repeated inbound notification for {} answered with call {}",
            call.carrier_call_id, call_id
        );
        Some(InboundResponse {
            call_id,
            directive: self.directive(call_id, Some(&call.carrier_call_id), &agent),
            degraded: false,
        })
    }

    /// Release the live entry for a terminal callback the store could not
    /// resolve
    async fn end_unresolved(&self, callback: &StatusCallback) {
        let call_id = match callback.call_id {
            Some(call_id) => Some(call_id),
            None => self
                .active
                .read()
                .await
                .iter()
                .find(|(_, active)| {
                    active.carrier_call_id.as_deref() == Some(callback.carrier_call_id.as_str())
                })
                .map(|(call_id, _)| *call_id),
        };
        if let Some(call_id) = call_id {
            self.end_call(&call_id).await;
        }
    }

    /// Cancel a live call's task, if any
    async fn end_call(&self, call_id: &CallId) {
        if let Some(active) = self.active.write().await.remove(call_id) {
            active.cancel.cancel();
            debug!("Call {} released", call_id);
        }
    }

    /// Track a live call. The entry is dropped if no media stream has
    /// started for it within the stream start deadline.
    async fn register(&self, call_id: CallId, call: ActiveCall) {
        let cancel = call.cancel.clone();
        self.active.write().await.insert(call_id, call);

        let registry = Arc::clone(&self.active);
        let deadline = self.config.stream_start_timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(deadline) => {
                    let mut active = registry.write().await;
                    let expired = active
                        .get(&call_id)
                        .is_some_and(|call| !call.streaming && !call.cancel.is_cancelled());
                    if expired {
                        if let Some(call) = active.remove(&call_id) {
                            call.cancel.cancel();
                        }
                        warn!("Call {} released, no media stream within {:?}", call_id, deadline);
                    }
                }
            }
        });
    }

    /// Registered state for a stream's call, rebuilt from the store when the
    /// call was set up before a restart
    async fn resume(
        &self,
        call_id: &CallId,
        start: &StreamStart,
    ) -> Result<ActiveCall, OrchestratorError> {
        if let Some(active) = self.active.write().await.get_mut(call_id) {
            active.streaming = true;
            return Ok(active.clone());
        }

        let record = self
            .store
            .find_by_id(call_id)
            .await
            .ok()
            .flatten()
            .filter(|record| !record.is_terminal())
            .ok_or_else(|| OrchestratorError::UnknownCall(call_id.to_string()))?;

        let agent = match start.parameter(AGENT_ID_PARAMETER).or(record.agent_id()) {
            Some(id) => self
                .agents
                .resolve_override(id)
                .unwrap_or_else(|_| self.agents.resolve_for_callee(record.to_address())),
            None => self.agents.resolve_for_callee(record.to_address()),
        };
        let active = ActiveCall {
            cancel: CancellationToken::new(),
            carrier_call_id: record.carrier_call_id().map(str::to_string),
            from_address: record.from_address().to_string(),
            agent,
            streaming: true,
        };
        self.register(*call_id, active.clone()).await;
        info!("Resumed call {} from the store", call_id);
        Ok(active)
    }

    /// Fatal session error: mark failed, record why, hang up the leg
    async fn fail_call(&self, call_id: CallId, carrier_call_id: &str, kind: &str, reason: &str) {
        error!("Call {} ({}) failed: {}", call_id, carrier_call_id, reason);
        self.mark_failed(call_id, kind, reason).await;
        if !carrier_call_id.is_empty() {
            if let Err(e) = self.carrier.hangup(carrier_call_id).await {
                warn!("Hangup of {} failed: {}", carrier_call_id, e);
            }
        }
        self.end_call(&call_id).await;
    }

    async fn mark_failed(&self, call_id: CallId, kind: &str, reason: &str) {
        let write = self
            .store
            .update_status(&call_id, CallStatus::Failed, Some(Utc::now()));
        self.persist("update_status", write).await;
        append(&*self.store, &CallEvent::error(call_id, kind, reason)).await;
    }

    async fn lookup(&self, callback: &StatusCallback) -> Option<Option<CallRecord>> {
        let found = self
            .persist(
                "find_by_carrier_call_id",
                self.store.find_by_carrier_call_id(&callback.carrier_call_id),
            )
            .await?;
        match (found, callback.call_id) {
            (Some(record), _) => Some(Some(record)),
            (None, Some(call_id)) => {
                self.persist("find_by_id", self.store.find_by_id(&call_id))
                    .await
            }
            (None, None) => Some(None),
        }
    }

    /// Run a store operation under the webhook deadline. Failures are
    /// logged and counted; `None` means the write did not happen.
    async fn persist<T, F>(&self, operation: &'static str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T, PersistenceError>>,
    {
        let result = match tokio::time::timeout(self.config.persistence_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(PersistenceError::Timeout),
        };
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                metrics::record_persistence_error(operation);
                warn!("Store {} failed: {}", operation, e);
                None
            }
        }
    }

    fn directive(
        &self,
        call_id: CallId,
        carrier_call_id: Option<&str>,
        agent: &ResolvedAgent,
    ) -> String {
        let mut directive = MediaDirective::new(self.config.media_relay_url.clone())
            .parameter(CALL_ID_PARAMETER, call_id.to_string());
        if let Some(sid) = carrier_call_id {
            directive = directive.parameter(CARRIER_CALL_ID_PARAMETER, sid);
        }
        if let Some(agent_id) = &agent.agent_id {
            directive = directive.parameter(AGENT_ID_PARAMETER, agent_id.clone());
        }
        directive.pause(self.config.keep_open_seconds).to_xml()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentProfile;
    use crate::domain::call::CallEventType;
    use crate::domain::tool::{BusinessOperations, OperationError, ToolContext, ToolInvocation};
    use crate::infrastructure::carrier::client::MockCarrierClient;
    use crate::infrastructure::persistence::InMemoryCallRecordStore;
    use crate::infrastructure::realtime::session::testing::ScriptedConnector;
    use crate::infrastructure::realtime::{RealtimeSessionClient, RealtimeSettings};
    use crate::infrastructure::retry::RetryPolicy;
    use async_trait::async_trait;
    use serde_json::Value;

    struct NoOperations;

    #[async_trait]
    impl BusinessOperations for NoOperations {
        async fn execute(
            &self,
            _context: &ToolContext,
            _invocation: &ToolInvocation,
        ) -> Result<Value, OperationError> {
            Err(OperationError::Rejected("not wired".into()))
        }
    }

    fn agents() -> AgentDirectory {
        AgentDirectory::new(
            Some("concierge".into()),
            HashMap::from([("+250788100200".to_string(), "rides".to_string())]),
            vec![
                AgentProfile {
                    id: "concierge".into(),
                    instructions: "Greet and route.".into(),
                    voice: None,
                },
                AgentProfile {
                    id: "rides".into(),
                    instructions: "Book rides.".into(),
                    voice: Some("verse".into()),
                },
            ],
            "Be helpful.",
        )
    }

    fn orchestrator(
        store: Arc<dyn CallRecordStore>,
        carrier: MockCarrierClient,
        connector: Arc<ScriptedConnector>,
    ) -> CallOrchestrator {
        let settings = RealtimeSettings {
            ready_grace: Duration::ZERO,
            ..RealtimeSettings::default()
        };
        let sessions = RealtimeSessionClient::new(connector, settings, RetryPolicy::default());
        let dispatcher = ToolDispatcher::new(
            Arc::new(NoOperations),
            Duration::from_secs(8),
            RetryPolicy::default(),
        );
        CallOrchestrator::new(
            store,
            Arc::new(sessions),
            Arc::new(carrier),
            agents(),
            Arc::new(dispatcher),
            OrchestratorConfig {
                media_relay_url: "wss://relay.example.com/media-stream".into(),
                caller_id: "+250788999000".into(),
                status_callback_url: "https://bridge.example.com/webhooks/status".into(),
                keep_open_seconds: 60,
                persistence_timeout: Duration::from_millis(500),
                stream_start_timeout: Duration::from_secs(120),
            },
        )
    }

    fn default_orchestrator(store: Arc<dyn CallRecordStore>) -> CallOrchestrator {
        orchestrator(store, MockCarrierClient::new(), Arc::new(ScriptedConnector::new(vec![])))
    }

    fn inbound(sid: &str) -> InboundCall {
        InboundCall {
            carrier_call_id: sid.into(),
            from: "+250788000111".into(),
            to: "+250788100200".into(),
        }
    }

    fn status(sid: &str, token: &str) -> StatusCallback {
        StatusCallback {
            carrier_call_id: sid.into(),
            status: token.into(),
            call_id: None,
        }
    }

    #[tokio::test]
    async fn test_inbound_creates_in_progress_record() {
        let store = Arc::new(InMemoryCallRecordStore::new());
        let orchestrator = default_orchestrator(store.clone());

        let response = orchestrator.handle_inbound(inbound("CA123")).await;

        assert!(!response.degraded);
        assert!(response.directive.contains("CA123"));
        assert!(response.directive.contains(&response.call_id.to_string()));
        assert!(response.directive.contains("<Parameter name=\"agentId\" value=\"rides\"/>"));

        let record = store.find_by_id(&response.call_id).await.unwrap().unwrap();
        assert_eq!(record.status(), CallStatus::InProgress);
        assert_eq!(record.agent_id(), Some("rides"));
        assert_eq!(orchestrator.active_calls().await, 1);
    }

    #[tokio::test]
    async fn test_status_sequence_is_idempotent() {
        let store = Arc::new(InMemoryCallRecordStore::new());
        let orchestrator = default_orchestrator(store.clone());
        let call_id = orchestrator.handle_inbound(inbound("CA200")).await.call_id;

        assert_eq!(
            orchestrator.handle_status(status("CA200", "answered")).await,
            StatusUpdateOutcome::Ignored(StatusChange::Unchanged)
        );
        assert_eq!(
            orchestrator.handle_status(status("CA200", "completed")).await,
            StatusUpdateOutcome::Applied {
                from: CallStatus::InProgress,
                to: CallStatus::Completed
            }
        );
        let first = store.find_by_id(&call_id).await.unwrap().unwrap();

        assert_eq!(
            orchestrator.handle_status(status("CA200", "COMPLETED")).await,
            StatusUpdateOutcome::Ignored(StatusChange::Unchanged)
        );
        let second = store.find_by_id(&call_id).await.unwrap().unwrap();

        assert_eq!(second.status(), CallStatus::Completed);
        assert!(first.ended_at().is_some());
        assert_eq!(first.ended_at(), second.ended_at());
        assert_eq!(orchestrator.active_calls().await, 0);
    }

    #[tokio::test]
    async fn test_terminal_status_not_left() {
        let store = Arc::new(InMemoryCallRecordStore::new());
        let orchestrator = default_orchestrator(store.clone());
        let call_id = orchestrator.handle_inbound(inbound("CA201")).await.call_id;

        orchestrator.handle_status(status("CA201", "busy")).await;
        let outcome = orchestrator.handle_status(status("CA201", "ringing")).await;

        assert!(matches!(
            outcome,
            StatusUpdateOutcome::Ignored(StatusChange::Terminal { .. })
        ));
        let record = store.find_by_id(&call_id).await.unwrap().unwrap();
        assert_eq!(record.status(), CallStatus::Busy);
    }

    #[tokio::test]
    async fn test_unrecognized_and_unknown_status() {
        let store = Arc::new(InMemoryCallRecordStore::new());
        let orchestrator = default_orchestrator(store);

        assert_eq!(
            orchestrator.handle_status(status("CA1", "teleported")).await,
            StatusUpdateOutcome::Unrecognized("teleported".into())
        );
        assert_eq!(
            orchestrator.handle_status(status("CA404", "completed")).await,
            StatusUpdateOutcome::UnknownCall
        );
    }

    #[tokio::test]
    async fn test_outbound_persists_carrier_id() {
        let store = Arc::new(InMemoryCallRecordStore::new());
        let mut carrier = MockCarrierClient::new();
        carrier
            .expect_place_call()
            .withf(|req| {
                req.to == "+250788555666"
                    && req.from == "+250788999000"
                    && req.directive.contains("callId")
                    && req.status_callback_url.starts_with("https://bridge.example.com/webhooks/status?callId=")
            })
            .times(1)
            .returning(|_| Ok("CA900".to_string()));
        let orchestrator =
            orchestrator(store.clone(), carrier, Arc::new(ScriptedConnector::new(vec![])));

        let response = orchestrator
            .place_outbound(OutboundCall {
                to: "+250788555666".into(),
                agent_id: Some("rides".into()),
            })
            .await
            .unwrap();

        assert_eq!(response.carrier_call_id, "CA900");
        let record = store.find_by_carrier_call_id("CA900").await.unwrap().unwrap();
        assert_eq!(record.id(), &response.call_id);
        assert_eq!(record.status(), CallStatus::Queued);
        assert_eq!(record.agent_id(), Some("rides"));
    }

    #[tokio::test]
    async fn test_outbound_unknown_agent_rejected() {
        let store = Arc::new(InMemoryCallRecordStore::new());
        let orchestrator = default_orchestrator(store);

        let result = orchestrator
            .place_outbound(OutboundCall {
                to: "+250788555666".into(),
                agent_id: Some("ghost".into()),
            })
            .await;

        assert!(matches!(
            result,
            Err(OrchestratorError::Domain(DomainError::NotFound(_)))
        ));
        assert_eq!(orchestrator.active_calls().await, 0);
    }

    #[tokio::test]
    async fn test_outbound_carrier_failure_releases_call() {
        let store = Arc::new(InMemoryCallRecordStore::new());
        let mut carrier = MockCarrierClient::new();
        carrier.expect_place_call().times(1).returning(|_| {
            Err(CarrierError::Api {
                status: 400,
                body: "invalid number".into(),
            })
        });
        let orchestrator =
            orchestrator(store.clone(), carrier, Arc::new(ScriptedConnector::new(vec![])));

        let result = orchestrator
            .place_outbound(OutboundCall {
                to: "bogus".into(),
                agent_id: None,
            })
            .await;

        assert!(matches!(result, Err(OrchestratorError::Carrier(_))));
        assert_eq!(orchestrator.active_calls().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_failure_fails_call_and_hangs_up() {
        let store = Arc::new(InMemoryCallRecordStore::new());
        let mut carrier = MockCarrierClient::new();
        carrier
            .expect_hangup()
            .withf(|sid| sid == "CA300")
            .times(1)
            .returning(|_| Ok(()));
        let connector = Arc::new(ScriptedConnector::new(vec![
            RealtimeError::Rejected("401 Unauthorized".into()),
        ]));
        let orchestrator = orchestrator(store.clone(), carrier, connector);
        let call_id = orchestrator.handle_inbound(inbound("CA300")).await.call_id;

        let start = StreamStart {
            stream_sid: "MZ1".into(),
            call_sid: Some("CA300".into()),
            custom_parameters: HashMap::from([(CALL_ID_PARAMETER.to_string(), call_id.to_string())]),
        };
        let (_tx, rx) = futures::channel::mpsc::unbounded::<CarrierFrame>();
        let (out_tx, _out_rx) = tokio::sync::mpsc::unbounded_channel();

        let result = orchestrator.run_media_stream(start, rx, out_tx).await;

        assert!(matches!(result, Err(OrchestratorError::Session(RealtimeError::Rejected(_)))));
        let record = store.find_by_id(&call_id).await.unwrap().unwrap();
        assert_eq!(record.status(), CallStatus::Failed);
        assert!(record.ended_at().is_some());
        let events = store.list_events(&call_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, CallEventType::Error);
    }

    /// Store that accepts reads but loses every new record
    struct LossyStore(InMemoryCallRecordStore);

    #[async_trait]
    impl CallRecordStore for LossyStore {
        async fn create(&self, _record: &CallRecord) -> Result<(), PersistenceError> {
            Err(PersistenceError::Database("disk full".into()))
        }

        async fn find_by_id(&self, id: &CallId) -> Result<Option<CallRecord>, PersistenceError> {
            self.0.find_by_id(id).await
        }

        async fn find_by_carrier_call_id(
            &self,
            carrier_call_id: &str,
        ) -> Result<Option<CallRecord>, PersistenceError> {
            self.0.find_by_carrier_call_id(carrier_call_id).await
        }

        async fn set_carrier_call_id(
            &self,
            id: &CallId,
            carrier_call_id: &str,
        ) -> Result<(), PersistenceError> {
            self.0.set_carrier_call_id(id, carrier_call_id).await
        }

        async fn update_status(
            &self,
            id: &CallId,
            status: CallStatus,
            ended_at: Option<chrono::DateTime<Utc>>,
        ) -> Result<bool, PersistenceError> {
            self.0.update_status(id, status, ended_at).await
        }

        async fn append_event(&self, event: &CallEvent) -> Result<(), PersistenceError> {
            self.0.append_event(event).await
        }

        async fn list_events(&self, call_id: &CallId) -> Result<Vec<CallEvent>, PersistenceError> {
            self.0.list_events(call_id).await
        }
    }

    #[tokio::test]
    async fn test_repeated_inbound_answers_with_same_call() {
        let store = Arc::new(InMemoryCallRecordStore::new());
        let orchestrator = default_orchestrator(store.clone());

        let first = orchestrator.handle_inbound(inbound("CA123")).await;
        let retry = orchestrator.handle_inbound(inbound("CA123")).await;

        assert_eq!(retry.call_id, first.call_id);
        assert!(!retry.degraded);
        assert_eq!(retry.directive, first.directive);
        assert_eq!(orchestrator.active_calls().await, 1);

        orchestrator.handle_status(status("CA123", "completed")).await;
        assert_eq!(orchestrator.active_calls().await, 0);
        let record = store.find_by_carrier_call_id("CA123").await.unwrap().unwrap();
        assert_eq!(record.id(), &first.call_id);
        assert_eq!(record.status(), CallStatus::Completed);
    }

    #[tokio::test]
    async fn test_repeated_inbound_after_restart_uses_stored_call() {
        let store = Arc::new(InMemoryCallRecordStore::new());
        let before = default_orchestrator(store.clone());
        let first = before.handle_inbound(inbound("CA124")).await;

        let after = default_orchestrator(store.clone());
        let retry = after.handle_inbound(inbound("CA124")).await;

        assert_eq!(retry.call_id, first.call_id);
        assert!(!retry.degraded);
        assert!(retry.directive.contains("<Parameter name=\"agentId\" value=\"rides\"/>"));
        assert_eq!(after.active_calls().await, 1);
    }

    #[tokio::test]
    async fn test_terminal_status_releases_unpersisted_call() {
        let store = Arc::new(LossyStore(InMemoryCallRecordStore::new()));
        let orchestrator = default_orchestrator(store);

        let response = orchestrator.handle_inbound(inbound("CA125")).await;
        assert!(response.degraded);
        assert_eq!(orchestrator.active_calls().await, 1);

        let outcome = orchestrator.handle_status(status("CA125", "completed")).await;

        assert_eq!(outcome, StatusUpdateOutcome::UnknownCall);
        assert_eq!(orchestrator.active_calls().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_without_stream_released_after_deadline() {
        let store = Arc::new(InMemoryCallRecordStore::new());
        let orchestrator = default_orchestrator(store);

        orchestrator.handle_inbound(inbound("CA126")).await;
        tokio::time::sleep(Duration::from_secs(119)).await;
        assert_eq!(orchestrator.active_calls().await, 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(orchestrator.active_calls().await, 0);
    }

    #[tokio::test]
    async fn test_stream_without_call_id_rejected() {
        let store = Arc::new(InMemoryCallRecordStore::new());
        let orchestrator = default_orchestrator(store);
        let start = StreamStart {
            stream_sid: "MZ2".into(),
            call_sid: None,
            custom_parameters: HashMap::new(),
        };
        let (_tx, rx) = futures::channel::mpsc::unbounded::<CarrierFrame>();
        let (out_tx, _out_rx) = tokio::sync::mpsc::unbounded_channel();

        let result = orchestrator.run_media_stream(start, rx, out_tx).await;
        assert!(matches!(result, Err(OrchestratorError::UnknownCall(_))));
    }
}
