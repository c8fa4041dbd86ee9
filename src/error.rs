//! # Error Handling
//!
//! Custom error types and their conversion to HTTP responses. Every failure
//! in the request path is caught at the handler boundary and mapped here;
//! clients only ever see two shapes:
//!
//! - `503` with `{"detail": "Whisper model not loaded"}` while the model
//!   handle is absent
//! - `500` with `{"detail": "Transcription failed: <message>"}` for any
//!   staging or inference failure
//!
//! Full diagnostic detail is logged server-side before the mapping; the
//! response body carries only the short message.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Failures that can surface from the transcription request path.
#[derive(Debug)]
pub enum AppError {
    /// The model failed to load at startup; permanent until restart.
    ModelUnavailable,

    /// Anything that went wrong while staging the upload or running
    /// inference. The string is the short client-facing message.
    Transcription(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::ModelUnavailable => write!(f, "Whisper model not loaded"),
            AppError::Transcription(msg) => write!(f, "Transcription failed: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::ModelUnavailable => HttpResponse::ServiceUnavailable().json(json!({
                "detail": "Whisper model not loaded"
            })),
            AppError::Transcription(msg) => HttpResponse::InternalServerError().json(json!({
                "detail": format!("Transcription failed: {}", msg)
            })),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Transcription(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Transcription(err.to_string())
    }
}

impl From<actix_multipart::MultipartError> for AppError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        AppError::Transcription(format!("invalid multipart payload: {}", err))
    }
}

/// Shorthand for results carried through the request path.
pub type AppResult<T> = Result<T, AppError>;
