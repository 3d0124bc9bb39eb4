//! Realtime session client: connect, configure, retry, close

use crate::domain::agent::ResolvedAgent;
use crate::domain::shared::value_objects::CallId;
use crate::domain::tool;
use crate::infrastructure::metrics;
use crate::infrastructure::realtime::protocol::{
    ClientEvent, InputAudioTranscription, SessionConfig, TurnDetection,
};
use crate::infrastructure::realtime::session::{RealtimeError, RealtimeSession, SessionConnector};
use crate::infrastructure::retry::{retry_with_backoff, RetryError, RetryPolicy};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Static session parameters
#[derive(Debug, Clone)]
pub struct RealtimeSettings {
    /// Model identifier announced in the handshake
    pub model: String,
    pub voice: String,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub transcription_model: String,
    pub vad_threshold: f32,
    pub vad_prefix_padding_ms: u32,
    pub vad_silence_duration_ms: u32,
    pub temperature: f32,
    pub connect_timeout: Duration,
    /// Pause after the handshake before the session counts as ready
    pub ready_grace: Duration,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-realtime-preview-2024-10-01".to_string(),
            voice: "alloy".to_string(),
            input_audio_format: "g711_ulaw".to_string(),
            output_audio_format: "g711_ulaw".to_string(),
            transcription_model: "whisper-1".to_string(),
            vad_threshold: 0.5,
            vad_prefix_padding_ms: 300,
            vad_silence_duration_ms: 500,
            temperature: 0.8,
            connect_timeout: Duration::from_secs(5),
            ready_grace: Duration::from_millis(250),
        }
    }
}

/// What a session is created for
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub call_id: CallId,
    /// Carrier call id, carried through logs and events
    pub correlation_id: String,
    pub instructions: String,
    pub voice: Option<String>,
}

impl SessionRequest {
    pub fn for_agent(call_id: CallId, correlation_id: impl Into<String>, agent: &ResolvedAgent) -> Self {
        Self {
            call_id,
            correlation_id: correlation_id.into(),
            instructions: agent.instructions.clone(),
            voice: agent.voice.clone(),
        }
    }
}

/// Creates and tears down model sessions
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(
        &self,
        request: &SessionRequest,
        cancel: &CancellationToken,
    ) -> Result<RealtimeSession, RealtimeError>;

    async fn close(&self, session: &RealtimeSession);
}

pub struct RealtimeSessionClient {
    connector: Arc<dyn SessionConnector>,
    settings: RealtimeSettings,
    policy: RetryPolicy,
}

impl RealtimeSessionClient {
    pub fn new(
        connector: Arc<dyn SessionConnector>,
        settings: RealtimeSettings,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            connector,
            settings,
            policy,
        }
    }

    /// Handshake payload for a request
    pub fn session_config(&self, request: &SessionRequest) -> SessionConfig {
        SessionConfig {
            model: self.settings.model.clone(),
            modalities: vec!["text", "audio"],
            instructions: request.instructions.clone(),
            voice: request
                .voice
                .clone()
                .unwrap_or_else(|| self.settings.voice.clone()),
            input_audio_format: self.settings.input_audio_format.clone(),
            output_audio_format: self.settings.output_audio_format.clone(),
            input_audio_transcription: InputAudioTranscription {
                model: self.settings.transcription_model.clone(),
            },
            turn_detection: TurnDetection::server_vad(
                self.settings.vad_threshold,
                self.settings.vad_prefix_padding_ms,
                self.settings.vad_silence_duration_ms,
            ),
            tools: tool::catalogue(),
            tool_choice: "auto",
            temperature: self.settings.temperature,
        }
    }

    async fn attempt(
        &self,
        request: &SessionRequest,
        attempt: u32,
    ) -> Result<RealtimeSession, RealtimeError> {
        metrics::record_session_connect_attempt();
        debug!(
            "Realtime connect attempt {} for call {} ({})",
            attempt + 1,
            request.call_id,
            request.correlation_id
        );

        let channel = tokio::time::timeout(self.settings.connect_timeout, self.connector.connect())
            .await
            .map_err(|_| RealtimeError::ConnectTimeout(self.settings.connect_timeout))??;

        let config = self.session_config(request);
        let session = RealtimeSession::new(
            request.call_id,
            request.correlation_id.clone(),
            config.clone(),
            channel,
        );

        if let Err(e) = session.send(&ClientEvent::session_update(config)).await {
            session.close().await;
            return Err(match e {
                RealtimeError::Closed => RealtimeError::Transport("closed during handshake".into()),
                other => other,
            });
        }

        if !self.settings.ready_grace.is_zero() {
            tokio::time::sleep(self.settings.ready_grace).await;
        }
        Ok(session)
    }
}

#[async_trait]
impl SessionFactory for RealtimeSessionClient {
    async fn create(
        &self,
        request: &SessionRequest,
        cancel: &CancellationToken,
    ) -> Result<RealtimeSession, RealtimeError> {
        let this = self;
        let result = retry_with_backoff(
            &self.policy,
            cancel,
            RealtimeError::is_retryable,
            move |attempt| this.attempt(request, attempt),
        )
        .await;

        match result {
            Ok(session) => {
                info!(
                    "Realtime session {} ready for call {} ({})",
                    session.id(),
                    request.call_id,
                    request.correlation_id
                );
                metrics::session_opened();
                Ok(session)
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                error!(
                    "Realtime session for call {} failed after {} attempts: {}",
                    request.call_id, attempts, last
                );
                metrics::record_session_failure();
                Err(RealtimeError::Exhausted {
                    attempts,
                    last: last.to_string(),
                })
            }
            Err(RetryError::NonRetryable(e)) => {
                error!("Realtime session for call {} failed: {}", request.call_id, e);
                metrics::record_session_failure();
                Err(e)
            }
            Err(RetryError::Cancelled) => {
                warn!("Realtime session creation for call {} cancelled", request.call_id);
                Err(RealtimeError::Cancelled)
            }
        }
    }

    async fn close(&self, session: &RealtimeSession) {
        if session.close().await {
            metrics::session_closed();
            info!(
                "Realtime session {} closed for call {}",
                session.id(),
                session.call_id()
            );
        }
    }
}
