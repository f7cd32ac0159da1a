//! WebSocket Call Relay
//!
//! This module runs call sessions over real sockets. It is structured into
//! submodules for clarity:
//!
//! - `leg`: readiness-checked writers for either leg and the keepalive task.
//! - `provider`: the outbound connection to the realtime voice endpoint.
//! - `session`: accepts the call leg and drives one `CallSession` to completion.

pub mod leg;
mod provider;
pub mod session;

pub use session::ws_handler;

/// Path the telephony platform opens its media stream on.
pub const CALL_STREAM_PATH: &str = "/twilio-stream";
