//! Realtime wire frames
//!
//! Client frames are a serde-tagged enum. Server frames are parsed through a
//! tagged representation; anything that does not match a known shape is
//! kept as `Unknown` so new server events never break the session.

use crate::domain::tool::ToolDefinition;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server-side voice activity detection parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

impl TurnDetection {
    pub fn server_vad(threshold: f32, prefix_padding_ms: u32, silence_duration_ms: u32) -> Self {
        Self {
            kind: "server_vad",
            threshold,
            prefix_padding_ms,
            silence_duration_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputAudioTranscription {
    pub model: String,
}

/// Configuration snapshot sent in the `session.update` handshake
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionConfig {
    pub model: String,
    pub modalities: Vec<&'static str>,
    pub instructions: String,
    pub voice: String,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub input_audio_transcription: InputAudioTranscription,
    pub turn_detection: TurnDetection,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: &'static str,
    pub temperature: f32,
}

/// Item carried by `conversation.item.create`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ConversationItem {
    #[serde(rename = "function_call_output")]
    FunctionCallOutput { call_id: String, output: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: Box<SessionConfig> },
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },
    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl ClientEvent {
    pub fn session_update(config: SessionConfig) -> Self {
        Self::SessionUpdate {
            session: Box::new(config),
        }
    }

    pub fn append_audio(audio: impl Into<String>) -> Self {
        Self::InputAudioBufferAppend {
            audio: audio.into(),
        }
    }

    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::ConversationItemCreate {
            item: ConversationItem::FunctionCallOutput {
                call_id: call_id.into(),
                output: output.into(),
            },
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerErrorBody {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    SessionCreated,
    SessionUpdated,
    /// Base64 audio chunk in the configured output format
    AudioDelta { delta: String },
    AssistantTranscriptDone { transcript: String },
    CallerTranscriptCompleted { transcript: String },
    /// Caller started talking over the model
    SpeechStarted,
    FunctionCallArgumentsDone {
        call_id: String,
        name: String,
        arguments: String,
    },
    ResponseDone,
    Error(ServerErrorBody),
    Unknown(Value),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ServerEventRepr {
    #[serde(rename = "session.created")]
    SessionCreated,
    #[serde(rename = "session.updated")]
    SessionUpdated,
    #[serde(rename = "response.audio.delta")]
    AudioDelta { delta: String },
    #[serde(rename = "response.audio_transcript.done")]
    AssistantTranscriptDone {
        #[serde(default)]
        transcript: String,
    },
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    CallerTranscriptCompleted {
        #[serde(default)]
        transcript: String,
    },
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: String,
    },
    #[serde(rename = "response.done")]
    ResponseDone,
    #[serde(rename = "error")]
    Error { error: ServerErrorBody },
}

impl From<ServerEventRepr> for ServerEvent {
    fn from(repr: ServerEventRepr) -> Self {
        match repr {
            ServerEventRepr::SessionCreated => Self::SessionCreated,
            ServerEventRepr::SessionUpdated => Self::SessionUpdated,
            ServerEventRepr::AudioDelta { delta } => Self::AudioDelta { delta },
            ServerEventRepr::AssistantTranscriptDone { transcript } => {
                Self::AssistantTranscriptDone { transcript }
            }
            ServerEventRepr::CallerTranscriptCompleted { transcript } => {
                Self::CallerTranscriptCompleted { transcript }
            }
            ServerEventRepr::SpeechStarted => Self::SpeechStarted,
            ServerEventRepr::FunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
            } => Self::FunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
            },
            ServerEventRepr::ResponseDone => Self::ResponseDone,
            ServerEventRepr::Error { error } => Self::Error(error),
        }
    }
}

impl ServerEvent {
    /// Parse a text frame. Fails only when the frame is not JSON.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        match ServerEventRepr::deserialize(value.clone()) {
            Ok(repr) => Ok(repr.into()),
            Err(err) => {
                tracing::trace!("Unhandled realtime frame: {err}");
                Ok(Self::Unknown(value))
            }
        }
    }
}
