//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - Store implementations (PostgreSQL, in-memory)
//! - Protocol implementations (SDP, realtime frames, carrier frames)
//! - External service integrations (carrier REST, dialogue model, operations)

pub mod carrier;
pub mod metrics;
pub mod operations;
pub mod persistence;
pub mod protocols;
pub mod realtime;
pub mod retry;
