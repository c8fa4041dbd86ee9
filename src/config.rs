//! # Configuration Management
//!
//! Loads application configuration from layered sources, highest priority
//! last:
//!
//! 1. Built-in defaults (the fixed behavior of the service)
//! 2. `config.toml` in the working directory, if present
//! 3. Environment variables with the `APP_` prefix
//! 4. `HOST` / `PORT` deployment-platform overrides
//!
//! The defaults reproduce the service's canonical behavior: bind every
//! interface on port 8000, load the `base` Whisper model once at startup,
//! transcribe with an English language hint at full precision.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub transcription: TranscriptionConfig,
}

/// Bind address for the HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Which Whisper model to load at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model size name: tiny, base, small, medium, or large.
    pub size: String,
}

/// Fixed inference parameters applied to every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// ISO 639-1 language hint passed to the model.
    pub language: String,
    /// Run inference with half-precision weights. Off means the model
    /// computes at full f32 precision.
    pub fp16: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            model: ModelConfig {
                size: "base".to_string(),
            },
            transcription: TranscriptionConfig {
                language: "en".to_string(),
                fp16: false,
            },
        }
    }
}

const KNOWN_MODEL_SIZES: &[&str] = &["tiny", "base", "small", "medium", "large"];

impl AppConfig {
    /// Load configuration from defaults, `config.toml`, and environment.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms commonly inject bare HOST/PORT variables
        // that don't follow the APP_ prefix convention.
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Reject configurations the server cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if !KNOWN_MODEL_SIZES.contains(&self.model.size.to_lowercase().as_str()) {
            return Err(anyhow::anyhow!(
                "Unknown model size '{}' (expected one of {})",
                self.model.size,
                KNOWN_MODEL_SIZES.join(", ")
            ));
        }

        if self.transcription.language.trim().is_empty() {
            return Err(anyhow::anyhow!("Transcription language cannot be empty"));
        }

        Ok(())
    }
}
