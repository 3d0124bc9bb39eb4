//! Telephony carrier integration

pub mod client;
pub mod directive;
pub mod media_frame;
pub mod signature;

pub use client::{CarrierClient, CarrierError, PlaceCallRequest, RestCarrierClient};
pub use directive::{hangup_directive, MediaDirective};
pub use media_frame::{CarrierFrame, OutboundFrame, StreamStart};
pub use signature::{SignatureValidator, SIGNATURE_HEADER};
