//! Configuration management
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! TOML file (`callbridge.toml`, or the path in `CALLBRIDGE_CONFIG`), then
//! environment variables such as `CALLBRIDGE__REALTIME__API_KEY`.

use crate::domain::agent::{AgentDirectory, AgentProfile};
use crate::infrastructure::realtime::RealtimeSettings;
use crate::infrastructure::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "CALLBRIDGE_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "callbridge.toml";
const ENV_PREFIX: &str = "CALLBRIDGE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub carrier: CarrierSettings,
    pub realtime: RealtimeEndpointSettings,
    pub retry: RetrySettings,
    pub tools: ToolSettings,
    pub agents: AgentSettings,
    pub persistence: PersistenceSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Public base URL the carrier calls; part of every webhook signature
    pub public_base_url: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_base_url: "http://localhost:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_ms: u64,
    pub idle_timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/callbridge".to_string(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout_ms: 5000,
            idle_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CarrierSettings {
    pub api_base: String,
    pub account_id: String,
    /// Also the webhook signing key
    pub auth_token: String,
    /// Caller id presented on outbound calls
    pub caller_id: String,
    /// WebSocket URL the carrier streams call audio to
    pub media_relay_url: String,
    pub status_callback_path: String,
    pub request_timeout_ms: u64,
    /// Seconds the leg stays open after the stream directive
    pub keep_open_seconds: u32,
    /// Seconds a call may wait for its media stream before it is released
    pub stream_start_timeout_seconds: u64,
    pub verify_signatures: bool,
}

impl Default for CarrierSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.twilio.com/2010-04-01".to_string(),
            account_id: String::new(),
            auth_token: String::new(),
            caller_id: String::new(),
            media_relay_url: "ws://localhost:8080/media-stream".to_string(),
            status_callback_path: "/webhooks/status".to_string(),
            request_timeout_ms: 1500,
            keep_open_seconds: 60,
            stream_start_timeout_seconds: 120,
            verify_signatures: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeEndpointSettings {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub voice: String,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub transcription_model: String,
    pub vad_threshold: f32,
    pub vad_prefix_padding_ms: u32,
    pub vad_silence_duration_ms: u32,
    pub temperature: f32,
    pub connect_timeout_ms: u64,
    pub ready_grace_ms: u64,
}

impl Default for RealtimeEndpointSettings {
    fn default() -> Self {
        let session = RealtimeSettings::default();
        Self {
            endpoint: "wss://api.openai.com/v1/realtime".to_string(),
            api_key: String::new(),
            model: session.model,
            voice: session.voice,
            input_audio_format: session.input_audio_format,
            output_audio_format: session.output_audio_format,
            transcription_model: session.transcription_model,
            vad_threshold: session.vad_threshold,
            vad_prefix_padding_ms: session.vad_prefix_padding_ms,
            vad_silence_duration_ms: session.vad_silence_duration_ms,
            temperature: session.temperature,
            connect_timeout_ms: session.connect_timeout.as_millis() as u64,
            ready_grace_ms: session.ready_grace.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_ms: u64,
    pub cap_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_ms: 100,
            cap_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Budget for one tool call, retries included
    pub timeout_ms: u64,
    pub operations_base_url: String,
    pub operations_api_key: Option<String>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 8000,
            operations_base_url: "http://localhost:9000".to_string(),
            operations_api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub default_agent: Option<String>,
    /// Instructions used when no profile matches
    pub fallback_instructions: String,
    /// Dialled number -> agent id
    pub bindings: HashMap<String, String>,
    pub profiles: Vec<AgentProfile>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            default_agent: None,
            fallback_instructions: "You are a helpful voice assistant on a phone call. \
                Keep answers short and conversational."
                .to_string(),
            bindings: HashMap::new(),
            profiles: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSettings {
    pub backend: StoreBackend,
    /// Deadline for store writes on the synchronous webhook path
    pub write_timeout_ms: u64,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            backend: if cfg!(feature = "postgres") {
                StoreBackend::Postgres
            } else {
                StoreBackend::Memory
            },
            write_timeout_ms: 500,
        }
    }
}

impl Settings {
    /// Load from the default file location and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path)
    }

    /// Load with `path` as the optional file layer
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let settings: Settings = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?)
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.base_ms == 0 || self.retry.cap_ms < self.retry.base_ms {
            return Err(ConfigError::Invalid(
                "retry.base_ms must be positive and not above retry.cap_ms".to_string(),
            ));
        }
        if self.tools.timeout_ms == 0 {
            return Err(ConfigError::Invalid("tools.timeout_ms must be positive".to_string()));
        }
        if self.carrier.stream_start_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "carrier.stream_start_timeout_seconds must be positive".to_string(),
            ));
        }
        if !self.carrier.status_callback_path.starts_with('/') {
            return Err(ConfigError::Invalid(
                "carrier.status_callback_path must start with '/'".to_string(),
            ));
        }
        if let Some(default) = &self.agents.default_agent {
            if !self.agents.profiles.iter().any(|p| &p.id == default) {
                return Err(ConfigError::Invalid(format!(
                    "agents.default_agent {} has no profile",
                    default
                )));
            }
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_ms),
            Duration::from_millis(self.retry.cap_ms),
        )
    }

    pub fn realtime_settings(&self) -> RealtimeSettings {
        let rt = &self.realtime;
        RealtimeSettings {
            model: rt.model.clone(),
            voice: rt.voice.clone(),
            input_audio_format: rt.input_audio_format.clone(),
            output_audio_format: rt.output_audio_format.clone(),
            transcription_model: rt.transcription_model.clone(),
            vad_threshold: rt.vad_threshold,
            vad_prefix_padding_ms: rt.vad_prefix_padding_ms,
            vad_silence_duration_ms: rt.vad_silence_duration_ms,
            temperature: rt.temperature,
            connect_timeout: Duration::from_millis(rt.connect_timeout_ms),
            ready_grace: Duration::from_millis(rt.ready_grace_ms),
        }
    }

    pub fn agent_directory(&self) -> AgentDirectory {
        AgentDirectory::new(
            self.agents.default_agent.clone(),
            self.agents.bindings.clone(),
            self.agents.profiles.clone(),
            self.agents.fallback_instructions.clone(),
        )
    }

    pub fn status_callback_url(&self) -> String {
        format!(
            "{}{}",
            self.server.public_base_url.trim_end_matches('/'),
            self.carrier.status_callback_path
        )
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tools.timeout_ms)
    }

    pub fn persistence_write_timeout(&self) -> Duration {
        Duration::from_millis(self.persistence.write_timeout_ms)
    }

    pub fn stream_start_timeout(&self) -> Duration {
        Duration::from_secs(self.carrier.stream_start_timeout_seconds)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
