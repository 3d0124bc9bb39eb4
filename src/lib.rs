//! callbridge - real-time voice-call orchestration and media bridge
//!
//! Turns inbound and outbound telephone calls into live conversations with
//! a streaming dialogue model. The carrier streams call audio over a
//! WebSocket; each call gets its own realtime model session, tool calls
//! from the model are routed to internal business operations, and every
//! call leaves an auditable record and event trail.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use domain::shared::error::{DomainError, Result};
