/// SDP offer/answer negotiation for the call's audio transport.
///
/// Signalling only: the answer advertises codecs, ICE credentials and a DTLS
/// fingerprint, but no candidates are gathered and no media is terminated
/// here. Audio reaches the dialogue model through the carrier's media stream.
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const ICE_UFRAG_LEN: usize = 8;
const ICE_PWD_LEN: usize = 24;
const CNAME_LEN: usize = 16;
const FINGERPRINT_BYTES: usize = 32;
const DEFAULT_PROTOCOL: &str = "UDP/TLS/RTP/SAVPF";
const DEFAULT_MID: &str = "0";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdpError {
    #[error("SDP offer is empty")]
    Empty,
    #[error("SDP offer does not start with v=0")]
    MissingVersion,
    #[error("Malformed SDP line: {0}")]
    Malformed(String),
}

/// SDP session type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

impl SdpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
        }
    }
}

/// Media direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaDirection {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

impl MediaDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaDirection::SendRecv => "sendrecv",
            MediaDirection::SendOnly => "sendonly",
            MediaDirection::RecvOnly => "recvonly",
            MediaDirection::Inactive => "inactive",
        }
    }

    fn from_attribute(s: &str) -> Option<Self> {
        match s {
            "sendrecv" => Some(MediaDirection::SendRecv),
            "sendonly" => Some(MediaDirection::SendOnly),
            "recvonly" => Some(MediaDirection::RecvOnly),
            "inactive" => Some(MediaDirection::Inactive),
            _ => None,
        }
    }
}

/// RTP codec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpCodec {
    pub payload_type: u8,
    pub name: &'static str,
    pub clock_rate: u32,
    pub channels: Option<u8>,
    pub fmtp: Option<&'static str>,
}

impl RtpCodec {
    /// Opus wideband
    pub fn opus() -> Self {
        Self {
            payload_type: 111,
            name: "opus",
            clock_rate: 48000,
            channels: Some(2),
            fmtp: Some("minptime=10;useinbandfec=1"),
        }
    }

    /// G.711 mu-law
    pub fn pcmu() -> Self {
        Self {
            payload_type: 0,
            name: "PCMU",
            clock_rate: 8000,
            channels: None,
            fmtp: None,
        }
    }

    /// G.711 A-law
    pub fn pcma() -> Self {
        Self {
            payload_type: 8,
            name: "PCMA",
            clock_rate: 8000,
            channels: None,
            fmtp: None,
        }
    }

    /// RFC 4733 DTMF events
    pub fn telephone_event() -> Self {
        Self {
            payload_type: 101,
            name: "telephone-event",
            clock_rate: 8000,
            channels: None,
            fmtp: Some("0-16"),
        }
    }

    /// Answer codec order: wideband first, narrowband fallbacks, DTMF last
    pub fn answer_set() -> Vec<Self> {
        vec![Self::opus(), Self::pcmu(), Self::pcma(), Self::telephone_event()]
    }

    /// To rtpmap format: "111 opus/48000/2"
    pub fn to_rtpmap(&self) -> String {
        match self.channels {
            Some(channels) => format!(
                "{} {}/{}/{}",
                self.payload_type, self.name, self.clock_rate, channels
            ),
            None => format!("{} {}/{}", self.payload_type, self.name, self.clock_rate),
        }
    }
}

/// DTLS fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtlsFingerprint {
    pub algorithm: &'static str,
    pub value: String,
}

impl DtlsFingerprint {
    /// SHA-256 style fingerprint over fresh random bytes, as colon-joined
    /// uppercase hex pairs
    pub fn random_sha256() -> Self {
        let bytes: [u8; FINGERPRINT_BYTES] = rand::thread_rng().gen();
        let value = bytes
            .iter()
            .map(|b| hex::encode_upper([*b]))
            .collect::<Vec<_>>()
            .join(":");
        Self {
            algorithm: "sha-256",
            value,
        }
    }

    /// To SDP format: "sha-256 AA:BB:CC:..."
    pub fn to_sdp(&self) -> String {
        format!("{} {}", self.algorithm, self.value)
    }
}

/// DTLS setup role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtlsSetup {
    Active,
    Passive,
    Actpass,
}

impl DtlsSetup {
    pub fn as_str(&self) -> &'static str {
        match self {
            DtlsSetup::Active => "active",
            DtlsSetup::Passive => "passive",
            DtlsSetup::Actpass => "actpass",
        }
    }

    pub fn from_attribute(s: &str) -> Option<Self> {
        match s {
            "active" => Some(DtlsSetup::Active),
            "passive" => Some(DtlsSetup::Passive),
            "actpass" => Some(DtlsSetup::Actpass),
            _ => None,
        }
    }

    /// Role the answerer takes for a given offerer role
    pub fn answer_to(offer: Option<DtlsSetup>) -> Self {
        match offer {
            Some(DtlsSetup::Active) => DtlsSetup::Passive,
            _ => DtlsSetup::Active,
        }
    }
}

/// One `m=` section of a parsed offer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferedMedia {
    pub media_type: String,
    pub port: u16,
    pub protocol: String,
    pub formats: Vec<String>,
    pub mid: Option<String>,
    pub direction: Option<MediaDirection>,
    pub setup: Option<DtlsSetup>,
    pub attributes: Vec<String>,
}

/// An offer split into session-level lines and media sections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOffer {
    pub session_lines: Vec<String>,
    pub media: Vec<OfferedMedia>,
}

impl ParsedOffer {
    pub fn parse(offer: &str) -> Result<Self, SdpError> {
        let mut lines = offer
            .split('\n')
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.trim().is_empty())
            .peekable();

        match lines.peek() {
            None => return Err(SdpError::Empty),
            Some(first) if first.trim() != "v=0" => return Err(SdpError::MissingVersion),
            _ => {}
        }

        let mut session_lines = Vec::new();
        let mut media: Vec<OfferedMedia> = Vec::new();

        for line in lines {
            if line.len() < 2 || line.as_bytes()[1] != b'=' {
                return Err(SdpError::Malformed(line.to_string()));
            }
            if let Some(m) = line.strip_prefix("m=") {
                media.push(parse_media_line(m).ok_or_else(|| SdpError::Malformed(line.to_string()))?);
                continue;
            }
            match media.last_mut() {
                None => session_lines.push(line.to_string()),
                Some(current) => {
                    if let Some(attr) = line.strip_prefix("a=") {
                        apply_media_attribute(current, attr);
                    }
                }
            }
        }

        Ok(Self {
            session_lines,
            media,
        })
    }

    pub fn audio(&self) -> Option<&OfferedMedia> {
        self.media.iter().find(|m| m.media_type == "audio" && m.port != 0)
    }

    fn has_bundle(&self) -> bool {
        self.session_lines
            .iter()
            .any(|l| l.starts_with("a=group:BUNDLE"))
    }
}

fn parse_media_line(rest: &str) -> Option<OfferedMedia> {
    let mut parts = rest.split_whitespace();
    let media_type = parts.next()?.to_string();
    // "port" or "port/count"
    let port = parts.next()?.split('/').next()?.parse().ok()?;
    let protocol = parts.next()?.to_string();
    let formats = parts.map(str::to_string).collect();
    Some(OfferedMedia {
        media_type,
        port,
        protocol,
        formats,
        mid: None,
        direction: None,
        setup: None,
        attributes: Vec::new(),
    })
}

fn apply_media_attribute(media: &mut OfferedMedia, attr: &str) {
    if let Some(mid) = attr.strip_prefix("mid:") {
        media.mid = Some(mid.trim().to_string());
    } else if let Some(setup) = attr.strip_prefix("setup:") {
        media.setup = DtlsSetup::from_attribute(setup.trim());
    } else if let Some(direction) = MediaDirection::from_attribute(attr) {
        media.direction = Some(direction);
    }
    media.attributes.push(attr.to_string());
}

/// Answer media section
#[derive(Debug, Clone)]
pub struct MediaDescription {
    pub port: u16,
    pub protocol: String,
    pub codecs: Vec<RtpCodec>,
    pub direction: MediaDirection,
    pub ice_ufrag: String,
    pub ice_pwd: String,
    pub dtls_fingerprint: DtlsFingerprint,
    pub dtls_setup: DtlsSetup,
    pub rtcp_mux: bool,
    pub mid: String,
    pub ssrc: u32,
    pub cname: String,
}

/// Generated SDP answer
#[derive(Debug, Clone)]
pub struct SdpAnswer {
    pub session_id: u64,
    pub bundle: bool,
    pub audio: MediaDescription,
}

impl SdpAnswer {
    pub fn sdp_type(&self) -> SdpType {
        SdpType::Answer
    }

    /// Convert to SDP string
    pub fn to_sdp_string(&self) -> String {
        let media = &self.audio;
        let mut sdp = String::new();

        // Session description
        sdp.push_str("v=0\r\n");
        sdp.push_str(&format!(
            "o=- {} 2 IN IP4 127.0.0.1\r\n",
            self.session_id
        ));
        sdp.push_str("s=-\r\n");
        sdp.push_str("t=0 0\r\n");
        if self.bundle {
            sdp.push_str(&format!("a=group:BUNDLE {}\r\n", media.mid));
        }

        // m= line
        let payload_types: Vec<String> = media
            .codecs
            .iter()
            .map(|c| c.payload_type.to_string())
            .collect();
        sdp.push_str(&format!(
            "m=audio {} {} {}\r\n",
            media.port,
            media.protocol,
            payload_types.join(" ")
        ));
        sdp.push_str("c=IN IP4 0.0.0.0\r\n");

        if media.rtcp_mux {
            sdp.push_str("a=rtcp-mux\r\n");
        }
        sdp.push_str(&format!("a=mid:{}\r\n", media.mid));
        sdp.push_str(&format!("a={}\r\n", media.direction.as_str()));

        // ICE credentials
        sdp.push_str(&format!("a=ice-ufrag:{}\r\n", media.ice_ufrag));
        sdp.push_str(&format!("a=ice-pwd:{}\r\n", media.ice_pwd));

        // DTLS
        sdp.push_str(&format!("a=fingerprint:{}\r\n", media.dtls_fingerprint.to_sdp()));
        sdp.push_str(&format!("a=setup:{}\r\n", media.dtls_setup.as_str()));

        // Codecs (rtpmap)
        for codec in &media.codecs {
            sdp.push_str(&format!("a=rtpmap:{}\r\n", codec.to_rtpmap()));
            if let Some(fmtp) = codec.fmtp {
                sdp.push_str(&format!("a=fmtp:{} {}\r\n", codec.payload_type, fmtp));
            }
        }

        sdp.push_str(&format!("a=ssrc:{} cname:{}\r\n", media.ssrc, media.cname));
        sdp
    }
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Produce an SDP answer for an offer.
///
/// The answer always carries exactly one audio section with the fixed codec
/// list, fresh ICE credentials, a fresh DTLS fingerprint and a fresh SSRC.
/// An offer without an active audio section gets a default one, with mid
/// `0` and the transport profile of the offer's first section.
pub fn negotiate_answer(offer: &str) -> Result<SdpAnswer, SdpError> {
    let parsed = ParsedOffer::parse(offer)?;
    let offered = parsed.audio();

    let protocol = offered
        .or_else(|| parsed.media.first())
        .map(|m| m.protocol.clone())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string());

    let mut rng = rand::thread_rng();
    let audio = MediaDescription {
        port: 9,
        protocol,
        codecs: RtpCodec::answer_set(),
        direction: MediaDirection::SendRecv,
        ice_ufrag: random_token(ICE_UFRAG_LEN),
        ice_pwd: random_token(ICE_PWD_LEN),
        dtls_fingerprint: DtlsFingerprint::random_sha256(),
        dtls_setup: DtlsSetup::answer_to(offered.and_then(|m| m.setup)),
        rtcp_mux: true,
        mid: offered
            .and_then(|m| m.mid.clone())
            .unwrap_or_else(|| DEFAULT_MID.to_string()),
        ssrc: rng.gen_range(1..=u32::MAX),
        cname: random_token(CNAME_LEN),
    };

    Ok(SdpAnswer {
        session_id: rng.gen_range(1..i64::MAX as u64),
        // a synthesized section is not part of the offer's bundle group
        bundle: offered.is_some() && parsed.has_bundle(),
        audio,
    })
}
