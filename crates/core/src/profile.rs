use crate::protocol::agent::{AgentCommand, ResponseSettings, SessionSettings};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_INSTRUCTIONS: &str = "You are Hannah, the friendly receptionist for \
Hanley Hospitality. Be natural, warm, and concise. You can answer questions about catering, \
menus, or bookings. Ask for clarification if needed.";

pub const DEFAULT_GREETING: &str =
    "Say 'Hi, this is Hannah from Hanley Hospitality. How can I help you today?'";

pub const DEFAULT_VOICE: &str = "alloy";

/// Sample rate of the realtime endpoint's `pcm16` format.
pub const REALTIME_PCM16_RATE: u32 = 24000;

/// 16-bit mono linear PCM at a fixed sample rate.
///
/// The same value feeds the stream directive handed to the telephony platform and
/// the `session.update` sent to the realtime endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: REALTIME_PCM16_RATE,
        }
    }
}

impl AudioFormat {
    /// Value of the `audio-format` attribute in the stream directive.
    pub fn stream_attribute(&self) -> String {
        format!("audio/x-pcm;bitrate={}", self.sample_rate)
    }

    /// Format name understood by the realtime endpoint, or `None` when it has
    /// no format at this sample rate.
    pub fn realtime_name(&self) -> Option<&'static str> {
        match self.sample_rate {
            REALTIME_PCM16_RATE => Some("pcm16"),
            _ => None,
        }
    }
}

/// Which audio tracks the telephony platform streams to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamTrack {
    #[default]
    InboundTrack,
    BothTracks,
}

impl StreamTrack {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamTrack::InboundTrack => "inbound_track",
            StreamTrack::BothTracks => "both_tracks",
        }
    }
}

impl fmt::Display for StreamTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamTrack {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "inbound_track" | "inbound" => Ok(StreamTrack::InboundTrack),
            "both_tracks" | "both" => Ok(StreamTrack::BothTracks),
            other => Err(format!(
                "'{}' is not a stream track (expected inbound_track or both_tracks)",
                other
            )),
        }
    }
}

/// Persona and audio settings applied to every call session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionProfile {
    pub instructions: String,
    pub voice: String,
    pub greeting: String,
    pub modalities: Vec<String>,
    pub audio_format: AudioFormat,
    /// Whether `session.update` spells out the input/output audio format.
    pub declare_audio_format: bool,
}

impl Default for SessionProfile {
    fn default() -> Self {
        Self {
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            greeting: DEFAULT_GREETING.to_string(),
            modalities: vec!["audio".to_string()],
            audio_format: AudioFormat::default(),
            declare_audio_format: true,
        }
    }
}

impl SessionProfile {
    pub fn session_update(&self) -> AgentCommand {
        // An inexpressible rate is left undeclared rather than misdeclared.
        let format = self
            .audio_format
            .realtime_name()
            .filter(|_| self.declare_audio_format)
            .map(str::to_owned);
        AgentCommand::SessionUpdate {
            session: SessionSettings {
                instructions: self.instructions.clone(),
                voice: self.voice.clone(),
                input_audio_format: format.clone(),
                output_audio_format: format,
            },
        }
    }

    pub fn greeting(&self) -> AgentCommand {
        AgentCommand::ResponseCreate {
            response: ResponseSettings {
                modalities: self.modalities.clone(),
                instructions: self.greeting.clone(),
            },
        }
    }
}
