//! API interface implementations

pub mod calls_handler;
pub mod dto;
pub mod media_stream;
pub mod metrics_handler;
pub mod router;
pub mod signature;
pub mod webhook_handler;

pub use metrics_handler::init_metrics;
pub use router::build_router;
pub use webhook_handler::AppState;
