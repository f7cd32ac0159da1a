//! Manages the lifecycle of one call session, from accepting the call leg to
//! tearing down both legs.
//!
//! A single task owns the `CallSession` state machine. Everything that happens
//! on the sockets or timers arrives as a `SessionEvent` on one channel, so the
//! machine sees events in a single order and no locks are held across them.

use super::{
    leg::{LegWriter, spawn_keepalive},
    provider::{self, AgentSocket},
};
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use callbridge_core::{Command, Leg, session::CallSession};
use futures_util::{
    StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::{collections::HashMap, sync::Arc};
use tokio::{
    sync::mpsc::{UnboundedSender, unbounded_channel},
    task::JoinHandle,
};
use tokio_tungstenite::tungstenite::Message as AgentMessage;
use tracing::{Instrument, debug, error, info, instrument, trace, warn};
use uuid::Uuid;

type CallWriter = LegWriter<SplitSink<WebSocket, Message>, Message>;
type AgentWriter = LegWriter<SplitSink<AgentSocket, AgentMessage>, AgentMessage>;

/// Everything the session task reacts to.
enum SessionEvent {
    AgentConnected(AgentSocket),
    AgentConnectFailed(anyhow::Error),
    CallText(String),
    CallClosed,
    AgentText(String),
    AgentClosed,
    GraceElapsed(Leg),
}

/// Axum handler to upgrade an HTTP connection to the call leg.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Runs one call session until both legs are closed.
#[instrument(name = "call_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4();
    tracing::Span::current().record("session_id", tracing::field::display(session_id));
    info!("Call leg connected.");

    let (call_sink, call_stream) = socket.split();
    let (events_tx, mut events_rx) = unbounded_channel();
    let mut runtime = SessionRuntime::new(
        state.clone(),
        Arc::new(LegWriter::new(Leg::Call, call_sink)),
        events_tx.clone(),
    );
    runtime.call_reader = Some(spawn_call_reader(call_stream, events_tx));

    let mut session = CallSession::new(state.profile.clone(), state.config.close_grace);
    state.calls.register(session_id).await;
    let commands = session.start();
    runtime.execute(commands).await;

    while !session.is_finished() {
        let Some(event) = events_rx.recv().await else {
            break;
        };
        let commands = match event {
            SessionEvent::AgentConnected(socket) => {
                runtime.attach_agent(socket);
                session.agent_opened()
            }
            SessionEvent::AgentConnectFailed(e) => {
                error!(error = ?e, "Agent leg could not be opened. Ending call.");
                runtime.connect = None;
                session.agent_connect_failed()
            }
            SessionEvent::CallText(text) => session.call_message(&text),
            SessionEvent::CallClosed => {
                // Completes the close handshake; no-op if we closed first.
                runtime.call.close().await;
                session.call_closed()
            }
            SessionEvent::AgentText(text) => session.agent_message(&text),
            SessionEvent::AgentClosed => {
                if let Some(agent) = &runtime.agent {
                    agent.close().await;
                }
                session.agent_closed()
            }
            SessionEvent::GraceElapsed(leg) => {
                runtime.grace.remove(&leg);
                session.grace_elapsed(leg)
            }
        };
        runtime.execute(commands).await;
        state.calls.update(session_id, &session).await;
    }

    runtime.shutdown();
    state.calls.remove(session_id).await;
    let stats = session.stats();
    info!(
        frames_to_agent = stats.frames_to_agent,
        frames_to_call = stats.frames_to_call,
        frames_dropped = stats.frames_dropped,
        malformed_frames = stats.malformed_frames,
        "Call session finished."
    );
}

/// Sockets and background tasks owned by one session.
struct SessionRuntime {
    state: Arc<AppState>,
    events: UnboundedSender<SessionEvent>,
    call: Arc<CallWriter>,
    agent: Option<AgentWriter>,
    connect: Option<JoinHandle<()>>,
    keepalive: Option<JoinHandle<()>>,
    call_reader: Option<JoinHandle<()>>,
    agent_reader: Option<JoinHandle<()>>,
    grace: HashMap<Leg, JoinHandle<()>>,
}

/// Aborts the task in `slot`, if any. Returns whether there was one.
fn abort_task(slot: &mut Option<JoinHandle<()>>) -> bool {
    match slot.take() {
        Some(handle) => {
            handle.abort();
            true
        }
        None => false,
    }
}

impl SessionRuntime {
    fn new(
        state: Arc<AppState>,
        call: Arc<CallWriter>,
        events: UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            state,
            events,
            call,
            agent: None,
            connect: None,
            keepalive: None,
            call_reader: None,
            agent_reader: None,
            grace: HashMap::new(),
        }
    }

    fn attach_agent(&mut self, socket: AgentSocket) {
        let (sink, stream) = socket.split();
        self.connect = None;
        self.agent = Some(LegWriter::new(Leg::Agent, sink));
        self.agent_reader = Some(spawn_agent_reader(stream, self.events.clone()));
    }

    async fn execute(&mut self, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::ConnectAgent => {
                    let config = self.state.config.clone();
                    let events = self.events.clone();
                    self.connect = Some(tokio::spawn(
                        async move {
                            let event = match provider::connect(&config).await {
                                Ok(socket) => SessionEvent::AgentConnected(socket),
                                Err(e) => SessionEvent::AgentConnectFailed(e),
                            };
                            let _ = events.send(event);
                        }
                        .in_current_span(),
                    ));
                }
                Command::AbortAgentConnect => {
                    if abort_task(&mut self.connect) {
                        debug!("Agent connect aborted.");
                    }
                }
                Command::StartKeepalive => {
                    abort_task(&mut self.keepalive);
                    self.keepalive = Some(spawn_keepalive(
                        self.call.clone(),
                        self.state.config.keepalive_interval,
                    ));
                }
                Command::CancelKeepalive => {
                    if abort_task(&mut self.keepalive) {
                        debug!("Keepalive cancelled.");
                    }
                }
                Command::SendToAgent(cmd) => {
                    let Some(agent) = &self.agent else {
                        debug!("No agent leg. Command dropped.");
                        continue;
                    };
                    match serde_json::to_string(&cmd) {
                        Ok(text) => {
                            if !agent.send_text(text).await {
                                debug!("Agent leg not open. Command dropped.");
                            }
                        }
                        Err(e) => error!(error = %e, "Failed to serialize agent command."),
                    }
                }
                Command::SendToCall(frame) => match serde_json::to_string(&frame) {
                    Ok(text) => {
                        if !self.call.send_text(text).await {
                            debug!("Call leg not open. Frame dropped.");
                        }
                    }
                    Err(e) => error!(error = %e, "Failed to serialize call frame."),
                },
                Command::ScheduleClose { leg, after } => {
                    if let Some(previous) = self.grace.remove(&leg) {
                        previous.abort();
                    }
                    let events = self.events.clone();
                    let handle = tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        let _ = events.send(SessionEvent::GraceElapsed(leg));
                    });
                    debug!(?leg, ?after, "Close scheduled.");
                    self.grace.insert(leg, handle);
                }
                Command::CancelScheduledClose(leg) => {
                    if let Some(handle) = self.grace.remove(&leg) {
                        handle.abort();
                        debug!(?leg, "Scheduled close cancelled.");
                    }
                }
                Command::Close(Leg::Call) => self.call.close().await,
                Command::Close(Leg::Agent) => {
                    if let Some(agent) = &self.agent {
                        agent.close().await;
                    }
                }
            }
        }
    }

    /// Stops every background task still attached to the session.
    fn shutdown(&mut self) {
        abort_task(&mut self.connect);
        abort_task(&mut self.keepalive);
        abort_task(&mut self.call_reader);
        abort_task(&mut self.agent_reader);
        for (_, handle) in self.grace.drain() {
            handle.abort();
        }
    }
}

/// Forwards text frames from the call leg until it closes or errors.
fn spawn_call_reader(
    mut stream: SplitStream<WebSocket>,
    events: UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            while let Some(msg_result) = stream.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        if events
                            .send(SessionEvent::CallText(text.as_str().to_owned()))
                            .is_err()
                        {
                            return;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "Call leg sent close frame.");
                        break;
                    }
                    Ok(Message::Binary(_)) => trace!("Ignoring binary frame on call leg."),
                    Ok(Message::Ping(_) | Message::Pong(_)) => {}
                    Err(e) => {
                        warn!(error = %e, "Error receiving from call leg.");
                        break;
                    }
                }
            }
            let _ = events.send(SessionEvent::CallClosed);
        }
        .in_current_span(),
    )
}

/// Forwards text frames from the agent leg until it closes or errors.
fn spawn_agent_reader(
    mut stream: SplitStream<AgentSocket>,
    events: UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            while let Some(msg_result) = stream.next().await {
                match msg_result {
                    Ok(AgentMessage::Text(text)) => {
                        if events
                            .send(SessionEvent::AgentText(text.as_str().to_owned()))
                            .is_err()
                        {
                            return;
                        }
                    }
                    Ok(AgentMessage::Close(frame)) => {
                        debug!(?frame, "Agent leg sent close frame.");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Error receiving from agent leg.");
                        break;
                    }
                }
            }
            let _ = events.send(SessionEvent::AgentClosed);
        }
        .in_current_span(),
    )
}
