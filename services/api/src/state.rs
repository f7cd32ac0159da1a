//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the configuration,
//! the persona applied to every call, and the registry of live calls.

use crate::{config::Config, registry::CallRegistry};
use callbridge_core::profile::SessionProfile;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub profile: Arc<SessionProfile>,
    pub calls: CallRegistry,
}

impl AppState {
    pub fn new(config: Config, profile: SessionProfile) -> Self {
        Self {
            config: Arc::new(config),
            profile: Arc::new(profile),
            calls: CallRegistry::default(),
        }
    }
}
