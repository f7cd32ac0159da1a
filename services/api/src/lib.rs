//! Callbridge API Library Crate
//!
//! This library contains the HTTP and WebSocket surface of the call relay:
//! configuration, the signaling endpoint, the live call registry, and the
//! runtime that drives each call session over real sockets. The `api` binary
//! is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod registry;
pub mod router;
pub mod state;
pub mod ws;
