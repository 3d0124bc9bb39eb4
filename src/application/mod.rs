//! Application layer - call orchestration use cases
//!
//! Coordinates the call record store, realtime sessions, the carrier and
//! tool dispatch. Nothing here speaks HTTP or SQL directly.

pub mod bridge;
pub mod orchestrator;
pub mod tool_dispatch;

pub use bridge::{BridgeExit, CallContext, MediaBridge};
pub use orchestrator::{
    CallOrchestrator, InboundCall, InboundResponse, OrchestratorConfig, OrchestratorError,
    OutboundCall, OutboundResponse, StatusCallback, StatusUpdateOutcome,
};
pub use tool_dispatch::{DispatchResult, ToolCallFrame, ToolDispatcher};
