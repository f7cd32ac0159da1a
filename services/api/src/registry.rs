//! Live Call Registry
//!
//! Each call session owns its sockets; the registry only holds a snapshot of
//! every live session for the `/calls` endpoint. Entries are written by the
//! session's own task and never read back by it.

use callbridge_core::session::{CallSession, Phase};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct CallSummary {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    #[schema(value_type = String, example = "active")]
    pub phase: Phase,
    pub stream_sid: Option<String>,
    pub started_at: DateTime<Utc>,
    pub frames_to_agent: u64,
    pub frames_to_call: u64,
    pub frames_dropped: u64,
    pub malformed_frames: u64,
}

impl CallSummary {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            phase: Phase::AwaitingAgentOpen,
            stream_sid: None,
            started_at: Utc::now(),
            frames_to_agent: 0,
            frames_to_call: 0,
            frames_dropped: 0,
            malformed_frames: 0,
        }
    }
}

#[derive(Clone, Default)]
pub struct CallRegistry {
    calls: Arc<Mutex<HashMap<Uuid, CallSummary>>>,
}

impl CallRegistry {
    pub async fn register(&self, id: Uuid) {
        self.calls.lock().await.insert(id, CallSummary::new(id));
    }

    /// Refreshes the snapshot for `id` from the session's current state.
    pub async fn update(&self, id: Uuid, session: &CallSession) {
        let mut calls = self.calls.lock().await;
        if let Some(summary) = calls.get_mut(&id) {
            let stats = session.stats();
            summary.phase = session.phase();
            summary.stream_sid = session.stream_sid().map(str::to_owned);
            summary.frames_to_agent = stats.frames_to_agent;
            summary.frames_to_call = stats.frames_to_call;
            summary.frames_dropped = stats.frames_dropped;
            summary.malformed_frames = stats.malformed_frames;
        }
    }

    pub async fn remove(&self, id: Uuid) {
        self.calls.lock().await.remove(&id);
    }

    #[cfg(test)]
    async fn get(&self, id: Uuid) -> Option<CallSummary> {
        self.calls.lock().await.get(&id).cloned()
    }

    /// All live calls, oldest first.
    pub async fn list(&self) -> Vec<CallSummary> {
        let mut calls: Vec<_> = self.calls.lock().await.values().cloned().collect();
        calls.sort_by_key(|c| c.started_at);
        calls
    }
}
