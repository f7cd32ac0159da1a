//! Axum Handlers for the HTTP API
//!
//! The signaling endpoint the telephony platform calls when a call comes in,
//! plus read-only views of the relay. Doc comments feed the `utoipa` OpenAPI
//! document.

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Json},
};
use callbridge_core::profile::{AudioFormat, StreamTrack};
use std::sync::Arc;
use tracing::info;

use crate::{registry::CallSummary, state::AppState};

/// Escapes the characters that are not allowed inside an XML attribute value.
fn escape_xml_attr(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Renders the markup that tells the telephony platform to open a media
/// stream to `stream_url`.
pub fn render_stream_directive(
    stream_url: &str,
    track: StreamTrack,
    format: &AudioFormat,
) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Connect>
    <Stream url="{}" track="{}" audio-format="{}" />
  </Connect>
</Response>
"#,
        escape_xml_attr(stream_url),
        track.as_str(),
        escape_xml_attr(&format.stream_attribute()),
    )
}

/// Answer an incoming call by connecting its audio to the relay.
#[utoipa::path(
    post,
    path = "/call",
    responses(
        (
            status = 200,
            description = "Stream directive for the telephony platform",
            body = String,
            content_type = "text/xml"
        )
    )
)]
pub async fn incoming_call(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let config = &state.config;
    info!(
        stream_url = %config.stream_url(),
        track = %config.stream_track,
        "Incoming call. Directing media stream to the relay."
    );
    (
        [(header::CONTENT_TYPE, "text/xml")],
        render_stream_directive(
            &config.stream_url(),
            config.stream_track,
            &state.profile.audio_format,
        ),
    )
}

/// List the calls currently being relayed.
#[utoipa::path(
    get,
    path = "/calls",
    responses(
        (status = 200, description = "Live call sessions, oldest first", body = [CallSummary])
    )
)]
pub async fn list_calls(State(state): State<Arc<AppState>>) -> Json<Vec<CallSummary>> {
    Json(state.calls.list().await)
}

/// Liveness probe for the hosting platform.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String))
)]
pub async fn health() -> &'static str {
    "ok"
}
