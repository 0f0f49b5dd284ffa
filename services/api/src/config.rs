//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    /// Where the session bundle is stored.
    pub data_path: PathBuf,
    pub openai_api_key: Option<String>,
    /// Overrides the provider endpoint for OpenAI-compatible servers.
    pub openai_base_url: Option<String>,
    pub chat_model: String,
    pub image_model: String,
    pub sst_model: String,
    pub tts_voice: String,
    pub save_debounce: Duration,
    pub allowed_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Server Settings ---
        let bind_address_str = var("BIND_ADDRESS", "127.0.0.1:3000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = var("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let data_path = PathBuf::from(var("DATA_PATH", "./data/companion.json"));

        let debounce_str = var("SAVE_DEBOUNCE_MS", "1500");
        let save_debounce = debounce_str
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::InvalidValue("SAVE_DEBOUNCE_MS".to_string(), e.to_string()))?;

        // --- Provider Settings ---
        let openai_api_key = lookup("OPENAI_API_KEY").filter(|key| !key.trim().is_empty());
        let openai_base_url = lookup("OPENAI_BASE_URL").filter(|url| !url.trim().is_empty());
        let chat_model = var("CHAT_MODEL", "gpt-4o-mini");
        let image_model = var("IMAGE_MODEL", "dall-e-3");
        let sst_model = var("SST_MODEL", "whisper-1");
        let tts_voice = var("TTS_VOICE", "nova");

        let allowed_origin = var("ALLOWED_ORIGIN", "http://localhost:5173");

        Ok(Self {
            bind_address,
            log_level,
            data_path,
            openai_api_key,
            openai_base_url,
            chat_model,
            image_model,
            sst_model,
            tts_voice,
            save_debounce,
            allowed_origin,
        })
    }

    /// The API key, which the server binary cannot start without.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))
    }
}
