//! Call-control markup returned to the carrier

use std::fmt::Write;

/// Opens a bidirectional audio stream to the relay endpoint, tagged with
/// correlation parameters, then keeps the leg open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDirective {
    stream_url: String,
    parameters: Vec<(String, String)>,
    pause_seconds: u32,
}

impl MediaDirective {
    pub fn new(stream_url: impl Into<String>) -> Self {
        Self {
            stream_url: stream_url.into(),
            parameters: Vec::new(),
            pause_seconds: 60,
        }
    }

    /// Add a correlation parameter; the carrier echoes it in the stream's start frame
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((name.into(), value.into()));
        self
    }

    pub fn pause(mut self, seconds: u32) -> Self {
        self.pause_seconds = seconds;
        self
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
        xml.push_str("<Response><Connect>");
        let _ = write!(xml, "<Stream url=\"{}\">", escape_xml(&self.stream_url));
        for (name, value) in &self.parameters {
            let _ = write!(
                xml,
                "<Parameter name=\"{}\" value=\"{}\"/>",
                escape_xml(name),
                escape_xml(value)
            );
        }
        xml.push_str("</Stream></Connect>");
        let _ = write!(xml, "<Pause length=\"{}\"/>", self.pause_seconds);
        xml.push_str("</Response>");
        xml
    }
}

/// Ends the live call
pub fn hangup_directive() -> String {
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Hangup/></Response>".to_string()
}

fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
