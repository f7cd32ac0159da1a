//! Realtime voice endpoint messages.

use super::ProtocolError;
use serde::{Deserialize, Serialize};

/// Commands sent to the realtime endpoint on the agent leg.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum AgentCommand {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionSettings },
    #[serde(rename = "response.create")]
    ResponseCreate { response: ResponseSettings },
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub instructions: String,
    pub voice: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ResponseSettings {
    pub modalities: Vec<String>,
    pub instructions: String,
}

/// Events received from the realtime endpoint. Only the ones that drive the
/// relay are modelled; everything else lands in `Other`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum AgentEvent {
    /// The endpoint applied our `session.update`.
    #[serde(rename = "session.updated")]
    SessionUpdated,
    #[serde(rename = "output_audio_buffer.delta")]
    OutputAudioBufferDelta { audio: String },
    #[serde(rename = "response.audio.delta", alias = "response.output_audio.delta")]
    ResponseAudioDelta { delta: String },
    #[serde(rename = "error")]
    Error { error: AgentError },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct AgentError {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl AgentEvent {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|source| ProtocolError::Malformed {
            leg: "agent",
            source,
        })
    }

    /// The base64 audio chunk carried by either delta shape.
    pub fn into_audio(self) -> Option<String> {
        match self {
            AgentEvent::OutputAudioBufferDelta { audio } => Some(audio),
            AgentEvent::ResponseAudioDelta { delta } => Some(delta),
            _ => None,
        }
    }
}
