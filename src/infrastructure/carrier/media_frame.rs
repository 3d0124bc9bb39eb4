//! Carrier media-stream frames
//!
//! JSON text frames exchanged with the carrier over the `/media-stream`
//! WebSocket. Audio payloads are base64 G.711 mu-law at 8 kHz, which the
//! realtime session is configured to accept and produce as-is.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStart {
    pub stream_sid: String,
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
}

impl StreamStart {
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.custom_parameters.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaPayload {
    #[serde(default)]
    pub track: Option<String>,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MarkBody {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CarrierFrame {
    Connected,
    Start(StreamStart),
    Media { payload: String },
    Mark { name: String },
    Stop,
    Unknown(Value),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum CarrierFrameRepr {
    Connected,
    Start { start: StreamStart },
    Media { media: MediaPayload },
    Mark { mark: MarkBody },
    Stop,
}

impl CarrierFrame {
    /// Parse a text frame. Fails only when the frame is not JSON.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        Ok(match CarrierFrameRepr::deserialize(value.clone()) {
            Ok(CarrierFrameRepr::Connected) => Self::Connected,
            Ok(CarrierFrameRepr::Start { start }) => Self::Start(start),
            // outbound-track echoes are not caller audio
            Ok(CarrierFrameRepr::Media { media })
                if media.track.as_deref().map_or(true, |t| t == "inbound") =>
            {
                Self::Media {
                    payload: media.payload,
                }
            }
            Ok(CarrierFrameRepr::Media { .. }) => Self::Unknown(value),
            Ok(CarrierFrameRepr::Mark { mark }) => Self::Mark { name: mark.name },
            Ok(CarrierFrameRepr::Stop) => Self::Stop,
            Err(_) => Self::Unknown(value),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMedia {
    pub payload: String,
}

/// Frames we send to the carrier
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundFrame {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    /// Drop audio the carrier has buffered but not yet played
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

impl OutboundFrame {
    pub fn media(stream_sid: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::Media {
            stream_sid: stream_sid.into(),
            media: OutboundMedia {
                payload: payload.into(),
            },
        }
    }

    pub fn clear(stream_sid: impl Into<String>) -> Self {
        Self::Clear {
            stream_sid: stream_sid.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_start() {
        let frame = CarrierFrame::parse(
            r#"{"event":"start","sequenceNumber":"1","streamSid":"MZ1",
                "start":{"streamSid":"MZ1","accountSid":"AC1","callSid":"CA123",
                "tracks":["inbound"],"customParameters":{"callId":"abc","agentId":"rides"}}}"#,
        )
        .unwrap();
        match frame {
            CarrierFrame::Start(start) => {
                assert_eq!(start.stream_sid, "MZ1");
                assert_eq!(start.call_sid.as_deref(), Some("CA123"));
                assert_eq!(start.parameter("callId"), Some("abc"));
                assert_eq!(start.parameter("missing"), None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_media_and_control() {
        assert_eq!(
            CarrierFrame::parse(
                r#"{"event":"media","streamSid":"MZ1","media":{"track":"inbound","chunk":"2","payload":"f39/"}}"#
            )
            .unwrap(),
            CarrierFrame::Media {
                payload: "f39/".into()
            }
        );
        assert_eq!(
            CarrierFrame::parse(r#"{"event":"connected","protocol":"Call"}"#).unwrap(),
            CarrierFrame::Connected
        );
        assert_eq!(
            CarrierFrame::parse(r#"{"event":"stop","streamSid":"MZ1","stop":{}}"#).unwrap(),
            CarrierFrame::Stop
        );
        assert!(matches!(
            CarrierFrame::parse(r#"{"event":"dtmf","dtmf":{"digit":"1"}}"#).unwrap(),
            CarrierFrame::Unknown(_)
        ));
        assert!(matches!(
            CarrierFrame::parse(
                r#"{"event":"media","media":{"track":"outbound","payload":"AA=="}}"#
            )
            .unwrap(),
            CarrierFrame::Unknown(_)
        ));
    }

    #[test]
    fn test_outbound_frames() {
        let media: Value = serde_json::from_str(&OutboundFrame::media("MZ1", "AAEC").to_json()).unwrap();
        assert_eq!(
            media,
            json!({"event": "media", "streamSid": "MZ1", "media": {"payload": "AAEC"}})
        );
        let clear: Value = serde_json::from_str(&OutboundFrame::clear("MZ1").to_json()).unwrap();
        assert_eq!(clear, json!({"event": "clear", "streamSid": "MZ1"}));
    }
}
