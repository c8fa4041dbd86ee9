//! # Transcription Backend
//!
//! Speech-to-text inference behind a trait object. The HTTP layer depends
//! on [`Transcriber`] instead of a concrete engine, which keeps request
//! handling decoupled from inference code and lets handler tests run
//! against a stub backend.

pub mod engine;
pub mod model;

use crate::error::AppResult;
use async_trait::async_trait;
use std::path::Path;

pub use engine::WhisperEngine;

/// Fixed parameters applied to a transcription call.
#[derive(Debug, Clone)]
pub struct TranscribeOptions {
    /// ISO 639-1 language hint such as `"en"`.
    pub language: String,
    /// Request half-precision inference. Disabled means full f32
    /// computation.
    pub fp16: bool,
}

impl TranscribeOptions {
    pub fn from_config(config: &crate::config::AppConfig) -> Self {
        Self {
            language: config.transcription.language.clone(),
            fp16: config.transcription.fp16,
        }
    }
}

/// Result of one inference call.
#[derive(Debug, Clone)]
pub struct TranscriptionOutput {
    /// Recognized text, untrimmed.
    pub text: String,
    /// Language the model reports, when it reports one.
    pub language: Option<String>,
}

/// Backend contract: transcribe the audio file at `path`.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        path: &Path,
        options: &TranscribeOptions,
    ) -> AppResult<TranscriptionOutput>;
}
