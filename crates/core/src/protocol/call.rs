//! Telephony media stream messages.

use super::ProtocolError;
use serde::{Deserialize, Serialize};

/// Messages received from the telephony platform on the call leg.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CallEvent {
    /// The platform opened the stream.
    Connected,
    /// Stream metadata, sent once before any media.
    Start { start: StreamStart },
    /// One chunk of base64 encoded caller audio.
    Media { media: InboundMedia },
    /// The platform is about to close the stream.
    Stop,
    /// `mark`, `dtmf` and anything newer.
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamStart {
    pub stream_sid: String,
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub tracks: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct InboundMedia {
    pub payload: String,
    /// `inbound` or `outbound`. Only present when the platform labels tracks.
    #[serde(default)]
    pub track: Option<String>,
}

impl InboundMedia {
    /// True for the platform's copy of audio we sent (with `both_tracks`).
    pub fn is_echo(&self) -> bool {
        self.track.as_deref() == Some("outbound")
    }
}

impl CallEvent {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|source| ProtocolError::Malformed {
            leg: "call",
            source,
        })
    }
}

/// Messages sent back to the telephony platform on the call leg.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CallFrame {
    Media {
        #[serde(rename = "streamSid", skip_serializing_if = "Option::is_none")]
        stream_sid: Option<String>,
        media: OutboundMedia,
    },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OutboundMedia {
    pub payload: String,
}

impl CallFrame {
    pub fn media(stream_sid: Option<String>, payload: String) -> Self {
        CallFrame::Media {
            stream_sid,
            media: OutboundMedia { payload },
        }
    }
}
