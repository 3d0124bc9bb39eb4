//! Streaming session to the dialogue model

pub mod client;
pub mod protocol;
pub mod session;
pub mod ws;

pub use client::{RealtimeSessionClient, RealtimeSettings, SessionFactory, SessionRequest};
pub use protocol::{ClientEvent, ServerEvent, SessionConfig};
pub use session::{
    FrameSink, FrameStream, RealtimeError, RealtimeSession, SessionChannel, SessionConnector,
    SessionSender,
};
pub use ws::WsConnector;
