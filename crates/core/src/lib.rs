pub mod profile;
pub mod protocol;
pub mod session;

use protocol::{agent::AgentCommand, call::CallFrame};
use serde::Serialize;
use std::time::Duration;

/// One side of a call session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
    /// The telephony media stream.
    Call,
    /// The realtime voice model connection.
    Agent,
}

/// Represents commands that the session logic issues to an external runtime.
///
/// This enum is the primary API for decoupling the relay's decisions from the
/// runtime's execution of side effects (socket writes, timers, connects).
/// Commands must be executed in the order they are returned.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Open the outbound connection to the realtime endpoint.
    ConnectAgent,
    /// Abandon an agent connection attempt that has not completed yet.
    AbortAgentConnect,
    /// Start the recurring liveness probe on the call leg.
    StartKeepalive,
    /// Stop the liveness probe. It must never fire again afterwards.
    CancelKeepalive,
    /// Serialize and send a command on the agent leg.
    SendToAgent(AgentCommand),
    /// Serialize and send a frame on the call leg.
    SendToCall(CallFrame),
    /// Close `leg` once `after` has elapsed, reporting back via `grace_elapsed`.
    ScheduleClose { leg: Leg, after: Duration },
    /// Drop a pending `ScheduleClose` for `leg` without firing it.
    CancelScheduledClose(Leg),
    /// Close `leg` now.
    Close(Leg),
}
