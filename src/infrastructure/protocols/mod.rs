//! Protocol implementations

pub mod sdp;

pub use sdp::{negotiate_answer, SdpAnswer, SdpError, SdpType};
