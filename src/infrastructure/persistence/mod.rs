//! Persistence implementations

pub mod memory;

#[cfg(feature = "postgres")]
pub mod call_record_repository;
#[cfg(feature = "postgres")]
pub mod database;

pub use memory::InMemoryCallRecordStore;

#[cfg(feature = "postgres")]
pub use call_record_repository::PgCallRecordStore;
#[cfg(feature = "postgres")]
pub use database::{create_pool, run_migrations};
