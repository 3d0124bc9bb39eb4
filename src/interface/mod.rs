//! Interface layer - HTTP webhooks, the carrier media-stream WebSocket and
//! read-only call queries

pub mod api;
