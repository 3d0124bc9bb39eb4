//! Per-call media bridge
//!
//! Relays caller audio to the realtime session and model audio back to the
//! carrier, records transcripts, and runs tool calls concurrently with the
//! audio loop.

use crate::application::tool_dispatch::{ToolCallFrame, ToolDispatcher};
use crate::domain::call::{CallEvent, CallRecordStore, TranscriptRole};
use crate::domain::shared::value_objects::CallId;
use crate::domain::tool::ToolContext;
use crate::infrastructure::carrier::{CarrierFrame, OutboundFrame};
use crate::infrastructure::metrics;
use crate::infrastructure::realtime::{ClientEvent, RealtimeSession, ServerEvent, SessionSender};
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const TOOL_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Identity of the call a bridge serves
#[derive(Debug, Clone)]
pub struct CallContext {
    pub call_id: CallId,
    pub carrier_call_id: String,
    pub from_address: String,
    pub agent_id: Option<String>,
    pub stream_sid: String,
}

impl CallContext {
    fn tool_context(&self) -> ToolContext {
        ToolContext {
            call_id: self.call_id,
            from_address: self.from_address.clone(),
            agent_id: self.agent_id.clone(),
        }
    }
}

/// Why a bridge loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeExit {
    /// Carrier sent a stop frame
    CarrierStopped,
    /// Carrier socket went away without a stop frame
    CarrierDisconnected,
    /// Model closed the session
    ModelClosed,
    ModelFailed(String),
    /// Call reached a terminal state elsewhere
    Cancelled,
}

impl BridgeExit {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeExit::CarrierStopped => "carrier_stopped",
            BridgeExit::CarrierDisconnected => "carrier_disconnected",
            BridgeExit::ModelClosed => "model_closed",
            BridgeExit::ModelFailed(_) => "model_failed",
            BridgeExit::Cancelled => "cancelled",
        }
    }

    /// The model side died while the caller was still there
    pub fn is_session_failure(&self) -> bool {
        matches!(self, BridgeExit::ModelClosed | BridgeExit::ModelFailed(_))
    }
}

pub struct MediaBridge {
    store: Arc<dyn CallRecordStore>,
    dispatcher: Arc<ToolDispatcher>,
}

impl MediaBridge {
    pub fn new(store: Arc<dyn CallRecordStore>, dispatcher: Arc<ToolDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Run until either side ends or `cancel` fires. In-flight tool calls
    /// are cancelled before returning.
    pub async fn run<S>(
        &self,
        call: &CallContext,
        session: &mut RealtimeSession,
        mut carrier_in: S,
        carrier_out: UnboundedSender<OutboundFrame>,
        cancel: &CancellationToken,
    ) -> BridgeExit
    where
        S: Stream<Item = CarrierFrame> + Unpin,
    {
        let sender = session.sender();
        let tool_cancel = cancel.child_token();
        let mut tools = JoinSet::new();

        info!(
            "Bridging call {} ({}) to session {}",
            call.call_id,
            call.carrier_call_id,
            session.id()
        );

        let exit = loop {
            tokio::select! {
                _ = cancel.cancelled() => break BridgeExit::Cancelled,
                frame = carrier_in.next() => match frame {
                    None => break BridgeExit::CarrierDisconnected,
                    Some(CarrierFrame::Stop) => break BridgeExit::CarrierStopped,
                    Some(CarrierFrame::Media { payload }) => {
                        if let Err(e) = sender.send(&ClientEvent::append_audio(payload)).await {
                            break BridgeExit::ModelFailed(e.to_string());
                        }
                    }
                    Some(CarrierFrame::Mark { name }) => debug!("Carrier played mark {}", name),
                    Some(_) => {}
                },
                event = session.next_event() => match event {
                    None => break BridgeExit::ModelClosed,
                    Some(Err(e)) => break BridgeExit::ModelFailed(e.to_string()),
                    Some(Ok(event)) => {
                        self.on_model_event(call, event, &sender, &carrier_out, &mut tools, &tool_cancel)
                            .await;
                    }
                },
                Some(joined) = tools.join_next(), if !tools.is_empty() => {
                    if let Err(e) = joined {
                        warn!("Tool task for call {} died: {}", call.call_id, e);
                    }
                }
            }
        };

        tool_cancel.cancel();
        let drained = tokio::time::timeout(TOOL_DRAIN_TIMEOUT, async {
            while tools.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tools.abort_all();
        }

        info!("Bridge for call {} ended: {}", call.call_id, exit.as_str());
        exit
    }

    async fn on_model_event(
        &self,
        call: &CallContext,
        event: ServerEvent,
        sender: &SessionSender,
        carrier_out: &UnboundedSender<OutboundFrame>,
        tools: &mut JoinSet<()>,
        tool_cancel: &CancellationToken,
    ) {
        match event {
            ServerEvent::AudioDelta { delta } => {
                if carrier_out
                    .send(OutboundFrame::media(&call.stream_sid, delta))
                    .is_err()
                {
                    debug!("Carrier writer gone for call {}", call.call_id);
                }
            }
            ServerEvent::SpeechStarted => {
                // caller barged in; drop whatever the carrier still has queued
                let _ = carrier_out.send(OutboundFrame::clear(&call.stream_sid));
            }
            ServerEvent::CallerTranscriptCompleted { transcript } => {
                self.transcript(call.call_id, TranscriptRole::Caller, &transcript).await;
            }
            ServerEvent::AssistantTranscriptDone { transcript } => {
                self.transcript(call.call_id, TranscriptRole::Agent, &transcript).await;
            }
            ServerEvent::FunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
            } => {
                let frame = ToolCallFrame {
                    correlation_id: call_id,
                    name,
                    arguments,
                };
                tools.spawn(run_tool(
                    self.store.clone(),
                    self.dispatcher.clone(),
                    sender.clone(),
                    call.tool_context(),
                    frame,
                    tool_cancel.clone(),
                ));
            }
            ServerEvent::Error(body) => {
                warn!(
                    "Model error on call {}: {} ({:?})",
                    call.call_id, body.message, body.code
                );
                let kind = body.kind.as_deref().unwrap_or("model_error");
                append(&*self.store, &CallEvent::error(call.call_id, kind, &body.message)).await;
            }
            ServerEvent::SessionCreated
            | ServerEvent::SessionUpdated
            | ServerEvent::ResponseDone
            | ServerEvent::Unknown(_) => {}
        }
    }

    async fn transcript(&self, call_id: CallId, role: TranscriptRole, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        append(&*self.store, &CallEvent::transcript(call_id, role, text)).await;
    }
}

/// Dispatch one tool call and answer the model exactly once
async fn run_tool(
    store: Arc<dyn CallRecordStore>,
    dispatcher: Arc<ToolDispatcher>,
    sender: SessionSender,
    context: ToolContext,
    frame: ToolCallFrame,
    cancel: CancellationToken,
) {
    let arguments = serde_json::from_str::<Value>(&frame.arguments)
        .unwrap_or_else(|_| Value::String(frame.arguments.clone()));
    append(
        &*store,
        &CallEvent::tool_call(context.call_id, &frame.correlation_id, &frame.name, arguments),
    )
    .await;

    let result = dispatcher.dispatch(&context, &frame, &cancel).await;

    let output = ClientEvent::function_call_output(&frame.correlation_id, result.outcome.to_output_string());
    match sender.send(&output).await {
        Ok(()) => {
            if let Err(e) = sender.send(&ClientEvent::ResponseCreate).await {
                warn!("Could not request a response on call {}: {}", context.call_id, e);
            }
        }
        Err(e) => warn!(
            "Could not return result of {} ({}) on call {}: {}",
            frame.name, frame.correlation_id, context.call_id, e
        ),
    }

    append(
        &*store,
        &CallEvent::tool_result(
            context.call_id,
            &frame.correlation_id,
            &frame.name,
            result.outcome.to_value(),
            result.latency.as_millis() as u64,
        ),
    )
    .await;
}

/// Event writes never interrupt a live call
pub(crate) async fn append(store: &dyn CallRecordStore, event: &CallEvent) {
    if let Err(e) = store.append_event(event).await {
        metrics::record_persistence_error("append_event");
        warn!(
            "Failed to record {} event for call {}: {}",
            event.event_type.as_str(),
            event.call_id,
            e
        );
    }
}
