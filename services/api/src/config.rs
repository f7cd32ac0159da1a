use crate::ws::CALL_STREAM_PATH;
use callbridge_core::profile::{AudioFormat, REALTIME_PCM16_RATE, SessionProfile, StreamTrack};
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Host the telephony platform can reach us on, used in the stream directive.
    pub public_hostname: String,
    pub openai_api_key: String,
    pub realtime_url: String,
    pub realtime_model: String,
    pub voice: String,
    pub stream_track: StreamTrack,
    pub audio_format: AudioFormat,
    pub declare_audio_format: bool,
    pub keepalive_interval: Duration,
    pub close_grace: Duration,
    /// Upper bound on opening the agent leg, handshake included.
    pub connect_timeout: Duration,
    pub log_level: Level,
    pub prompts_path: Option<PathBuf>,
}

/// Reads `name` and parses it, falling back to `default` when unset.
fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address = match std::env::var("BIND_ADDRESS") {
            Ok(raw) => raw.parse::<SocketAddr>().map_err(|e| {
                ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
            })?,
            Err(_) => {
                let port: u16 = parse_var("PORT", 10000)?;
                SocketAddr::from(([0, 0, 0, 0], port))
            }
        };

        let public_hostname = std::env::var("PUBLIC_HOSTNAME")
            .or_else(|_| std::env::var("RENDER_EXTERNAL_HOSTNAME"))
            .map_err(|_| ConfigError::MissingVar("PUBLIC_HOSTNAME".to_string()))?;

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let realtime_url = std::env::var("REALTIME_URL")
            .unwrap_or_else(|_| "wss://api.openai.com/v1/realtime".to_string());
        if !realtime_url.starts_with("ws://") && !realtime_url.starts_with("wss://") {
            return Err(ConfigError::InvalidValue(
                "REALTIME_URL".to_string(),
                format!("'{}' is not a ws:// or wss:// URL", realtime_url),
            ));
        }

        let realtime_model = std::env::var("REALTIME_MODEL")
            .unwrap_or_else(|_| "gpt-4o-realtime-preview".to_string());
        let voice = std::env::var("REALTIME_VOICE").unwrap_or_else(|_| "alloy".to_string());

        let stream_track = parse_var("STREAM_TRACK", StreamTrack::default())?;
        let sample_rate: u32 = parse_var("AUDIO_SAMPLE_RATE", REALTIME_PCM16_RATE)?;
        if sample_rate == 0 {
            return Err(ConfigError::InvalidValue(
                "AUDIO_SAMPLE_RATE".to_string(),
                "sample rate must be positive".to_string(),
            ));
        }
        let audio_format = AudioFormat { sample_rate };
        let declare_audio_format = parse_var("DECLARE_AUDIO_FORMAT", true)?;
        // The directive and session.update must name the same format.
        if declare_audio_format && audio_format.realtime_name().is_none() {
            return Err(ConfigError::InvalidValue(
                "AUDIO_SAMPLE_RATE".to_string(),
                format!(
                    "the realtime endpoint has no PCM format at {} Hz (expected {}, \
                     or set DECLARE_AUDIO_FORMAT=false)",
                    sample_rate, REALTIME_PCM16_RATE
                ),
            ));
        }

        let keepalive_secs: u64 = parse_var("KEEPALIVE_INTERVAL_SECS", 10)?;
        if keepalive_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "KEEPALIVE_INTERVAL_SECS".to_string(),
                "interval must be at least one second".to_string(),
            ));
        }
        let close_grace_ms: u64 = parse_var("CLOSE_GRACE_MS", 1000)?;
        let connect_timeout_ms: u64 = parse_var("CONNECT_TIMEOUT_MS", 5000)?;
        if connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "CONNECT_TIMEOUT_MS".to_string(),
                "timeout must be positive".to_string(),
            ));
        }

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = std::env::var("PROMPTS_PATH").ok().map(PathBuf::from);

        Ok(Self {
            bind_address,
            public_hostname,
            openai_api_key,
            realtime_url,
            realtime_model,
            voice,
            stream_track,
            audio_format,
            declare_audio_format,
            keepalive_interval: Duration::from_secs(keepalive_secs),
            close_grace: Duration::from_millis(close_grace_ms),
            connect_timeout: Duration::from_millis(connect_timeout_ms),
            log_level,
            prompts_path,
        })
    }

    /// Agent endpoint with the model selector applied.
    pub fn realtime_endpoint(&self) -> String {
        format!("{}?model={}", self.realtime_url, self.realtime_model)
    }

    /// The URL the telephony platform should stream call audio to.
    pub fn stream_url(&self) -> String {
        format!("wss://{}{}", self.public_hostname, CALL_STREAM_PATH)
    }

    /// Persona defaults with this deployment's voice and audio format applied.
    pub fn session_profile(&self) -> SessionProfile {
        SessionProfile {
            voice: self.voice.clone(),
            audio_format: self.audio_format,
            declare_audio_format: self.declare_audio_format,
            ..Default::default()
        }
    }
}
