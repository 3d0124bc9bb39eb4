//! Adapters for internal business operations

pub mod http;

pub use http::HttpBusinessOperations;
