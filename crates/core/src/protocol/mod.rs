//! Wire formats for both legs of a call session.
//!
//! - `call`: the telephony media stream (JSON objects tagged by `event`).
//! - `agent`: the realtime voice endpoint (JSON objects tagged by `type`).

pub mod agent;
pub mod call;

/// A frame that could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed {leg} frame: {source}")]
    Malformed {
        leg: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
