//! Main Entrypoint for the Callbridge API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Resolving the persona applied to every call, with optional prompt overrides.
//! 3. Constructing the Axum router and applying middleware.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use callbridge_api::{config::Config, router::create_router, state::AppState};
use callbridge_core::profile::SessionProfile;
use std::{collections::HashMap, fs, net::SocketAddr, path::Path, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C. Running until killed.");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// Loads every `*.md` file in `prompts_path`, keyed by file stem.
fn load_prompts(prompts_path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in fs::read_dir(prompts_path)
        .with_context(|| format!("Failed to read prompts directory {}", prompts_path.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content.trim().to_string());
        }
    }
    Ok(prompts)
}

/// Builds the persona from config, replacing the built-in instructions and
/// greeting with `instructions.md` and `greeting.md` when present.
fn resolve_profile(config: &Config) -> anyhow::Result<SessionProfile> {
    let mut profile = config.session_profile();
    let Some(path) = &config.prompts_path else {
        return Ok(profile);
    };
    let mut prompts = load_prompts(path)?;
    if let Some(instructions) = prompts.remove("instructions") {
        info!("Using instructions.md from prompts directory.");
        profile.instructions = instructions;
    }
    if let Some(greeting) = prompts.remove("greeting") {
        info!("Using greeting.md from prompts directory.");
        profile.greeting = greeting;
    }
    Ok(profile)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Resolve the Persona ---
    let profile = resolve_profile(&config)?;
    let app_state = Arc::new(AppState::new(config.clone(), profile));

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // --- 5. Start Server ---
    info!(
        model = %config.realtime_model,
        voice = %config.voice,
        track = %config.stream_track,
        stream_url = %config.stream_url(),
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
