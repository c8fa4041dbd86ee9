//! # Transcription Handlers
//!
//! The request-handling contract for audio uploads:
//!
//! 1. Fail fast with 503 while the model handle is absent (no file I/O).
//! 2. Pull the single file part out of the multipart payload.
//! 3. Stage the bytes to a temp file whose extension comes from the
//!    upload's filename or declared content type.
//! 4. Invoke the backend with the fixed language hint and precision mode.
//! 5. Shape the response; the staged file is deleted on every exit path.
//!
//! `/transcribe`, `/api/transcribe`, and `/whisper/transcribe` are all
//! registrations of [`transcribe`]; `/v1/audio/transcriptions` adapts the
//! same call down to a bare text value.

use crate::error::{AppError, AppResult};
use crate::staging::{infer_extension, StagedFile};
use crate::state::AppState;
use crate::transcription::TranscribeOptions;
use actix_multipart::{Field, Multipart};
use actix_web::web;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Structured transcription response. `text` and `transcript` always carry
/// the same value; both keys are kept for backward-compatible clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeResponse {
    pub text: String,
    pub transcript: String,
    pub language: String,
}

/// One file pulled out of a multipart payload.
struct FileUpload {
    bytes: Vec<u8>,
    filename: Option<String>,
    content_type: Option<String>,
}

/// Primary handler, registered under all three structured-response routes.
pub async fn transcribe(
    state: web::Data<AppState>,
    payload: Multipart,
) -> AppResult<web::Json<TranscribeResponse>> {
    let response = run_transcription(&state, payload).await?;
    Ok(web::Json(response))
}

/// OpenAI-compatible adapter: same underlying call, bare text response.
pub async fn transcribe_openai(
    state: web::Data<AppState>,
    payload: Multipart,
) -> AppResult<web::Json<String>> {
    let response = run_transcription(&state, payload).await?;
    Ok(web::Json(response.text))
}

/// The attempt-then-cleanup sequence shared by every transcription route.
async fn run_transcription(
    state: &AppState,
    payload: Multipart,
) -> AppResult<TranscribeResponse> {
    // Model presence is checked before touching the payload or the
    // filesystem; an unavailable model never creates a temp file.
    let transcriber = state.transcriber().ok_or(AppError::ModelUnavailable)?;

    let upload = read_file_upload(payload).await?;

    let extension = infer_extension(upload.filename.as_deref(), upload.content_type.as_deref());
    let staged = StagedFile::create(&upload.bytes, &extension)?;

    info!(
        "Transcribing file: {} ({} bytes)",
        upload.filename.as_deref().unwrap_or("unknown"),
        upload.bytes.len()
    );

    let options = TranscribeOptions::from_config(&state.get_config());

    state.begin_transcription();
    let result = transcriber.transcribe(staged.path(), &options).await;
    state.end_transcription();

    let output = result.map_err(|e| {
        error!("Transcription error: {}", e);
        e
    })?;

    let text = output.text.trim().to_string();
    info!("Transcription completed: {} characters", text.len());

    Ok(TranscribeResponse {
        transcript: text.clone(),
        language: output.language.unwrap_or_else(|| "en".to_string()),
        text,
    })
    // `staged` drops here on success and on every early return above,
    // removing the temp file.
}

/// Walk the multipart payload and collect the upload: the first part that
/// carries a filename, or that uses a conventional file field name.
async fn read_file_upload(mut payload: Multipart) -> AppResult<FileUpload> {
    while let Some(item) = payload.next().await {
        let mut field: Field = item?;

        let (field_name, filename) = match field.content_disposition() {
            Some(disposition) => (
                disposition.get_name().unwrap_or_default().to_string(),
                disposition.get_filename().map(|s| s.to_string()),
            ),
            None => continue,
        };

        if filename.is_none() && field_name != "file" && field_name != "audio" {
            continue;
        }

        let content_type = field.content_type().map(|mime| mime.essence_str().to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            bytes.extend_from_slice(&chunk?);
        }

        return Ok(FileUpload {
            bytes,
            filename,
            content_type,
        });
    }

    Err(AppError::Transcription(
        "no file field in multipart payload".to_string(),
    ))
}
