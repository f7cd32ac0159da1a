//! Per-call relay state machine.
//!
//! `CallSession` owns no sockets. The runtime feeds it leg events (opened,
//! message, closed, timer fired) and executes the `Command`s it returns. All
//! ordering rules live here: configuration before greeting, greeting before caller
//! audio, and a bounded teardown of one leg after the other goes away.

use crate::{
    Command, Leg,
    profile::SessionProfile,
    protocol::{
        agent::{AgentCommand, AgentEvent},
        call::{CallEvent, CallFrame},
    },
};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, trace, warn};

/// Grace delay before closing the companion leg.
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for the agent connection to open. Nothing is forwarded.
    AwaitingAgentOpen,
    /// `session.update` sent, waiting for `session.updated`.
    Configuring,
    /// Greeting requested. Caller audio now flows to the agent.
    Ready,
    /// At least one audio frame has been relayed since the greeting.
    Active,
    /// One leg is gone and the other is being torn down.
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AgentLink {
    NotStarted,
    Connecting,
    Open,
    Closed,
}

/// Frame counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub frames_to_agent: u64,
    pub frames_to_call: u64,
    pub frames_dropped: u64,
    pub malformed_frames: u64,
}

pub struct CallSession {
    profile: Arc<SessionProfile>,
    close_grace: Duration,
    phase: Phase,
    call_open: bool,
    agent: AgentLink,
    greeting_sent: bool,
    keepalive_running: bool,
    call_close_pending: bool,
    agent_close_pending: bool,
    stream_sid: Option<String>,
    stats: SessionStats,
}

impl CallSession {
    /// Creates a session for a call leg that has just been accepted.
    pub fn new(profile: Arc<SessionProfile>, close_grace: Duration) -> Self {
        Self {
            profile,
            close_grace,
            phase: Phase::AwaitingAgentOpen,
            call_open: true,
            agent: AgentLink::NotStarted,
            greeting_sent: false,
            keepalive_running: false,
            call_close_pending: false,
            agent_close_pending: false,
            stream_sid: None,
            stats: SessionStats::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    /// Both legs are closed and no work is outstanding.
    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Closed
    }

    /// Kicks off the session: keepalive on the call leg and the agent connect.
    pub fn start(&mut self) -> Vec<Command> {
        if self.agent != AgentLink::NotStarted || !self.call_open {
            return vec![];
        }
        self.agent = AgentLink::Connecting;
        self.keepalive_running = true;
        vec![Command::StartKeepalive, Command::ConnectAgent]
    }

    /// The agent connection is open. Sends the session configuration.
    pub fn agent_opened(&mut self) -> Vec<Command> {
        if !self.call_open || self.agent != AgentLink::Connecting {
            // The call went away while we were connecting.
            self.agent = AgentLink::Closed;
            self.settle();
            return vec![Command::Close(Leg::Agent)];
        }
        info!("Agent leg open. Sending session configuration.");
        self.agent = AgentLink::Open;
        self.phase = Phase::Configuring;
        vec![Command::SendToAgent(self.profile.session_update())]
    }

    /// The agent connection could not be established. The call leg is closed
    /// right away rather than left silent.
    pub fn agent_connect_failed(&mut self) -> Vec<Command> {
        if self.agent != AgentLink::Connecting {
            return vec![];
        }
        self.agent = AgentLink::Closed;
        let mut commands = self.cancel_keepalive();
        if self.call_open {
            self.call_open = false;
            commands.push(Command::Close(Leg::Call));
        }
        self.settle();
        commands
    }

    /// A text frame arrived on the call leg.
    pub fn call_message(&mut self, text: &str) -> Vec<Command> {
        if !self.call_open {
            return vec![];
        }
        let event = match CallEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                self.stats.malformed_frames += 1;
                warn!(error = %e, "Dropping malformed call frame.");
                return vec![];
            }
        };

        match event {
            CallEvent::Media { media } => {
                if media.is_echo() {
                    trace!("Ignoring outbound track echo.");
                    return vec![];
                }
                if !self.forwards_caller_audio() {
                    self.stats.frames_dropped += 1;
                    trace!(phase = ?self.phase, "Agent leg not ready. Dropping caller audio.");
                    return vec![];
                }
                self.phase = Phase::Active;
                self.stats.frames_to_agent += 1;
                vec![Command::SendToAgent(AgentCommand::InputAudioBufferAppend {
                    audio: media.payload,
                })]
            }
            CallEvent::Start { start } => {
                info!(
                    stream_sid = %start.stream_sid,
                    call_sid = ?start.call_sid,
                    tracks = ?start.tracks,
                    "Media stream started."
                );
                self.stream_sid = Some(start.stream_sid);
                vec![]
            }
            CallEvent::Connected => {
                debug!("Media stream connected.");
                vec![]
            }
            CallEvent::Stop => {
                info!("Media stream stop received.");
                vec![]
            }
            CallEvent::Other => vec![],
        }
    }

    /// A text frame arrived on the agent leg.
    pub fn agent_message(&mut self, text: &str) -> Vec<Command> {
        if self.agent != AgentLink::Open {
            return vec![];
        }
        let event = match AgentEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                self.stats.malformed_frames += 1;
                warn!(error = %e, "Dropping malformed agent frame.");
                return vec![];
            }
        };

        match event {
            AgentEvent::SessionUpdated => {
                if self.phase != Phase::Configuring || self.greeting_sent {
                    debug!("Ignoring repeated session acknowledgement.");
                    return vec![];
                }
                info!("Session configured. Requesting greeting.");
                self.greeting_sent = true;
                self.phase = Phase::Ready;
                vec![Command::SendToAgent(self.profile.greeting())]
            }
            AgentEvent::Error { error } => {
                warn!(
                    message = ?error.message,
                    kind = ?error.kind,
                    code = ?error.code,
                    "Agent endpoint reported an error."
                );
                vec![]
            }
            event @ (AgentEvent::OutputAudioBufferDelta { .. }
            | AgentEvent::ResponseAudioDelta { .. }) => {
                let Some(audio) = event.into_audio() else {
                    return vec![];
                };
                if !self.call_open {
                    self.stats.frames_dropped += 1;
                    return vec![];
                }
                if self.phase == Phase::Ready {
                    self.phase = Phase::Active;
                }
                self.stats.frames_to_call += 1;
                vec![Command::SendToCall(CallFrame::media(
                    self.stream_sid.clone(),
                    audio,
                ))]
            }
            AgentEvent::Other => vec![],
        }
    }

    /// The call leg closed. Closing twice is a no-op.
    pub fn call_closed(&mut self) -> Vec<Command> {
        if !self.call_open {
            return vec![];
        }
        info!("Call leg closed.");
        self.call_open = false;
        let mut commands = self.cancel_keepalive();
        if self.call_close_pending {
            self.call_close_pending = false;
            commands.push(Command::CancelScheduledClose(Leg::Call));
        }
        match self.agent {
            AgentLink::Connecting => {
                self.agent = AgentLink::Closed;
                commands.push(Command::AbortAgentConnect);
            }
            AgentLink::Open if !self.agent_close_pending => {
                self.agent_close_pending = true;
                commands.push(Command::ScheduleClose {
                    leg: Leg::Agent,
                    after: self.close_grace,
                });
            }
            _ => {}
        }
        self.settle();
        commands
    }

    /// The agent leg closed. Closing twice is a no-op.
    pub fn agent_closed(&mut self) -> Vec<Command> {
        if self.agent != AgentLink::Open {
            return vec![];
        }
        info!("Agent leg closed.");
        self.agent = AgentLink::Closed;
        let mut commands = self.cancel_keepalive();
        if self.agent_close_pending {
            self.agent_close_pending = false;
            commands.push(Command::CancelScheduledClose(Leg::Agent));
        }
        if self.call_open && !self.call_close_pending {
            self.call_close_pending = true;
            commands.push(Command::ScheduleClose {
                leg: Leg::Call,
                after: self.close_grace,
            });
        }
        self.settle();
        commands
    }

    /// A close scheduled with `Command::ScheduleClose` is due.
    pub fn grace_elapsed(&mut self, leg: Leg) -> Vec<Command> {
        let commands = match leg {
            Leg::Call if self.call_close_pending => {
                self.call_close_pending = false;
                if self.call_open {
                    self.call_open = false;
                    vec![Command::Close(Leg::Call)]
                } else {
                    vec![]
                }
            }
            Leg::Agent if self.agent_close_pending => {
                self.agent_close_pending = false;
                if self.agent == AgentLink::Open {
                    self.agent = AgentLink::Closed;
                    vec![Command::Close(Leg::Agent)]
                } else {
                    vec![]
                }
            }
            _ => vec![],
        };
        self.settle();
        commands
    }

    fn forwards_caller_audio(&self) -> bool {
        self.agent == AgentLink::Open && matches!(self.phase, Phase::Ready | Phase::Active)
    }

    fn cancel_keepalive(&mut self) -> Vec<Command> {
        if std::mem::take(&mut self.keepalive_running) {
            vec![Command::CancelKeepalive]
        } else {
            vec![]
        }
    }

    fn settle(&mut self) {
        let agent_live = matches!(self.agent, AgentLink::Connecting | AgentLink::Open);
        if !self.call_open && !agent_live {
            if self.phase != Phase::Closed {
                info!(stats = ?self.stats, "Call session closed.");
            }
            self.phase = Phase::Closed;
        } else if !self.call_open || self.agent == AgentLink::Closed {
            self.phase = Phase::Closing;
        }
    }
}
