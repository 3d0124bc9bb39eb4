//! Domain layer - Core business logic and rules
//!
//! This layer contains:
//! - Aggregates: the call record and its lifecycle rules
//! - Value Objects: identifiers and the canonical status vocabulary
//! - Domain Services: carrier status mapping, agent resolution
//! - Ports: the call record store and business operations

pub mod agent;
pub mod call;
pub mod shared;
pub mod tool;

// Re-export commonly used types
pub use shared::{DomainError, Result};
