//! # Whisper Engine
//!
//! The process-wide transcription backend: one loaded [`WhisperModel`]
//! behind an async mutex. The Candle decoder mutates per-call state and is
//! not reentrant, so concurrent requests queue at the mutex; everything
//! before the model call (upload parsing, staging, decoding) still
//! overlaps freely.

use crate::audio;
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::transcription::model::{ModelSize, WhisperModel, SAMPLE_RATE};
use crate::transcription::{TranscribeOptions, TranscriptionOutput, Transcriber};
use anyhow::Result;
use async_trait::async_trait;
use candle_core::Device;
use std::path::Path;
use tokio::sync::Mutex;

pub struct WhisperEngine {
    model: Mutex<WhisperModel>,
    size: ModelSize,
}

impl WhisperEngine {
    /// Load the configured checkpoint. Called exactly once at startup,
    /// before the server accepts requests; the caller decides how to
    /// degrade when this fails.
    pub async fn initialize(config: &AppConfig) -> Result<Self> {
        let size: ModelSize = config.model.size.parse()?;
        let model = WhisperModel::load(size, Device::Cpu, config.transcription.fp16).await?;
        Ok(Self {
            model: Mutex::new(model),
            size,
        })
    }

    pub fn model_size(&self) -> ModelSize {
        self.size
    }
}

#[async_trait]
impl Transcriber for WhisperEngine {
    async fn transcribe(
        &self,
        path: &Path,
        options: &TranscribeOptions,
    ) -> AppResult<TranscriptionOutput> {
        let samples = audio::decode_wav(path, SAMPLE_RATE).map_err(AppError::from)?;

        tracing::debug!(
            seconds = samples.len() as f64 / SAMPLE_RATE as f64,
            language = %options.language,
            fp16 = options.fp16,
            "Running inference"
        );

        // Serialization point: the decoder is stateful.
        let mut model = self.model.lock().await;
        let text = model
            .transcribe(&samples, Some(options.language.as_str()))
            .map_err(AppError::from)?;

        Ok(TranscriptionOutput {
            text,
            language: Some(options.language.clone()),
        })
    }
}
