#![allow(dead_code)]

use callbridge_api::{
    config::Config, registry::CallSummary, router::create_router, state::AppState,
};
use callbridge_core::profile::{AudioFormat, StreamTrack};
use futures::{SinkExt, Stream, StreamExt};
use serde_json::Value;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time::timeout,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, accept_hdr_async, connect_async,
    tungstenite::{
        Error as WsError, Message,
        handshake::server::{ErrorResponse, Request, Response},
    },
};
use tracing::Level;

pub const WAIT: Duration = Duration::from_secs(3);

pub type CallClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One connection accepted by the mock realtime endpoint.
pub struct AgentConn {
    pub ws: WebSocketStream<TcpStream>,
    pub uri: String,
    pub authorization: Option<String>,
}

/// A stand-in for the realtime endpoint that hands every accepted
/// connection to the test.
pub struct MockAgent {
    pub addr: SocketAddr,
    conns: mpsc::UnboundedReceiver<AgentConn>,
}

impl MockAgent {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, conns) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut seen = None;
                    let callback = |req: &Request, resp: Response| {
                        let authorization = req
                            .headers()
                            .get("Authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_owned);
                        seen = Some((req.uri().to_string(), authorization));
                        Ok::<Response, ErrorResponse>(resp)
                    };
                    let Ok(ws) = accept_hdr_async(stream, callback).await else {
                        return;
                    };
                    let (uri, authorization) = seen.unwrap_or_default();
                    let _ = tx.send(AgentConn {
                        ws,
                        uri,
                        authorization,
                    });
                });
            }
        });
        Self { addr, conns }
    }

    pub async fn accept(&mut self) -> AgentConn {
        timeout(WAIT, self.conns.recv())
            .await
            .expect("Timed out waiting for agent connection")
            .expect("Mock agent stopped")
    }

    /// Accepts the next connection and checks the opening `session.update`.
    pub async fn accept_configured(&mut self) -> AgentConn {
        let mut conn = self.accept().await;
        let update = next_json(&mut conn.ws).await;
        assert_eq!(update["type"], "session.update");
        conn
    }
}

/// Accepts TCP connections and never answers the upgrade request.
pub async fn start_silent_endpoint() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    addr
}

pub fn test_config(realtime: SocketAddr) -> Config {
    Config {
        bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
        public_hostname: "relay.example.com".to_string(),
        openai_api_key: "test-key".to_string(),
        realtime_url: format!("ws://{}/v1/realtime", realtime),
        realtime_model: "test-model".to_string(),
        voice: "alloy".to_string(),
        stream_track: StreamTrack::InboundTrack,
        audio_format: AudioFormat::default(),
        declare_audio_format: true,
        keepalive_interval: Duration::from_millis(200),
        close_grace: Duration::from_millis(100),
        connect_timeout: Duration::from_millis(500),
        log_level: Level::DEBUG,
        prompts_path: None,
    }
}

/// Serves the full router on an ephemeral port.
pub async fn spawn_relay(config: Config) -> (SocketAddr, Arc<AppState>) {
    let profile = config.session_profile();
    let state = Arc::new(AppState::new(config, profile));
    let app = create_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

pub async fn connect_call(relay: SocketAddr) -> CallClient {
    let (ws, _) = connect_async(format!("ws://{}/twilio-stream", relay))
        .await
        .expect("Call leg should connect");
    ws
}

pub async fn send_json<S>(ws: &mut S, value: Value)
where
    S: futures::Sink<Message> + Unpin,
    S::Error: std::fmt::Debug,
{
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("Send should succeed");
}

/// Next text frame, skipping control frames.
pub async fn next_text<S>(ws: &mut S) -> String
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let read = async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text.as_str().to_owned(),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                other => panic!("Expected text frame, got {:?}", other),
            }
        }
    };
    timeout(WAIT, read).await.expect("Timed out waiting for text frame")
}

pub async fn next_json<S>(ws: &mut S) -> Value
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    serde_json::from_str(&next_text(ws).await).expect("Frame should be JSON")
}

/// Waits for the peer to close the socket. Anything else is skipped.
pub async fn expect_close<S>(ws: &mut S)
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let read = async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => continue,
            }
        }
    };
    timeout(WAIT, read).await.expect("Timed out waiting for close");
}

/// Polls the live call registry until `check` holds or the wait runs out.
pub async fn wait_for_calls<F>(state: &AppState, check: F)
where
    F: Fn(&[CallSummary]) -> bool,
{
    let poll = async {
        loop {
            if check(&state.calls.list().await) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    timeout(WAIT, poll).await.expect("Call registry never reached expected state");
}
