//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application:
//! the signaling endpoint, the call stream WebSocket, and the read-only
//! observability routes. Requests to any other path get a 404 and never
//! create a call session.

use crate::{
    handlers,
    registry::CallSummary,
    state::AppState,
    ws::{CALL_STREAM_PATH, ws_handler},
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::incoming_call,
        handlers::list_calls,
        handlers::health,
    ),
    components(
        schemas(CallSummary)
    ),
    tags(
        (name = "Callbridge API", description = "Telephony signaling and live call relay")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/call", post(handlers::incoming_call))
        .route("/calls", get(handlers::list_calls))
        .route("/health", get(handlers::health))
        .route(CALL_STREAM_PATH, get(ws_handler))
        .with_state(app_state)
}
