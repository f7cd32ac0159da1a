//! Handles the WebSocket connection to the OpenAI realtime endpoint.

use crate::config::Config;
use anyhow::{Context, Result, anyhow};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::client::IntoClientRequest,
};
use tracing::info;

pub type AgentSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens the agent leg: model selected by query parameter, bearer token in the
/// `Authorization` header. Gives up after `connect_timeout`, handshake
/// included. No retry; the caller decides what a failure means.
pub async fn connect(config: &Config) -> Result<AgentSocket> {
    let url = config.realtime_endpoint();
    let mut request = url.as_str().into_client_request()?;
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {}", config.openai_api_key).parse()?,
    );
    request.headers_mut().insert("OpenAI-Beta", "realtime=v1".parse()?);

    let (ws_stream, _) = tokio::time::timeout(config.connect_timeout, connect_async(request))
        .await
        .map_err(|_| {
            anyhow!(
                "Realtime endpoint did not complete the handshake within {:?}",
                config.connect_timeout
            )
        })?
        .with_context(|| {
            format!("Failed to connect to realtime endpoint {}", config.realtime_url)
        })?;
    info!(model = %config.realtime_model, "Connected to realtime endpoint.");
    Ok(ws_stream)
}
