//! Call bounded context - call records, their lifecycle and audit trail

pub mod aggregate;
pub mod event;
pub mod repository;
pub mod status_mapper;
pub mod value_object;

pub use aggregate::{CallRecord, StatusChange};
pub use event::{CallEvent, CallEventType, TranscriptRole};
pub use repository::{CallRecordStore, PersistenceError};
pub use status_mapper::{map_carrier_status, CarrierStatus};
pub use value_object::{CallDirection, CallStatus};
