//! # Upload Staging
//!
//! The transcription backend consumes a file path, so each upload is staged
//! to a uniquely-named temporary file for the duration of its request.
//!
//! Invariant: no staged file ever outlives its request. [`StagedFile`]
//! deletes its path on `Drop`, which runs on every exit from the handler
//! scope, including error returns and unwinding. Deletion failures are
//! logged as warnings and never surfaced to the client.

use crate::error::AppResult;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Fallback extension when neither the filename nor the content type tells
/// us anything.
const DEFAULT_EXTENSION: &str = ".m4a";

/// Content types the upload may declare, mapped to staging extensions.
const CONTENT_TYPE_EXTENSIONS: &[(&str, &str)] = &[
    ("audio/mpeg", ".mp3"),
    ("audio/wav", ".wav"),
    ("audio/m4a", ".m4a"),
    ("audio/mp4", ".mp4"),
    ("audio/ogg", ".ogg"),
];

/// Resolve the staging extension for an upload, first match wins:
///
/// 1. A filename with a non-empty extension contributes it verbatim.
/// 2. A declared content type in the lookup table contributes its mapping.
/// 3. Otherwise `.m4a`.
pub fn infer_extension(filename: Option<&str>, content_type: Option<&str>) -> String {
    if let Some(name) = filename {
        if let Some(ext) = Path::new(name).extension().and_then(|e| e.to_str()) {
            if !ext.is_empty() {
                return format!(".{}", ext);
            }
        }
    }

    if let Some(declared) = content_type {
        for (mime, ext) in CONTENT_TYPE_EXTENSIONS {
            if *mime == declared {
                return (*ext).to_string();
            }
        }
    }

    DEFAULT_EXTENSION.to_string()
}

/// A temporary file holding one upload's bytes, owned exclusively by the
/// handling request and removed when dropped.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    /// Write the upload body to a fresh uniquely-named file in the OS temp
    /// directory. The v4 UUID in the name keeps concurrent requests from
    /// ever colliding.
    pub fn create(bytes: &[u8], extension: &str) -> AppResult<Self> {
        let path = std::env::temp_dir().join(format!(
            "whisper-upload-{}{}",
            Uuid::new_v4(),
            extension
        ));
        std::fs::write(&path, bytes)?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Staged upload");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.path.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to delete temp file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_extension_wins() {
        assert_eq!(infer_extension(Some("foo.wav"), None), ".wav");
        // Filename beats a declared content type.
        assert_eq!(infer_extension(Some("foo.wav"), Some("audio/mpeg")), ".wav");
        // Verbatim, case preserved.
        assert_eq!(infer_extension(Some("clip.MP3"), None), ".MP3");
    }

    #[test]
    fn test_content_type_mapping() {
        assert_eq!(infer_extension(None, Some("audio/mpeg")), ".mp3");
        assert_eq!(infer_extension(None, Some("audio/wav")), ".wav");
        assert_eq!(infer_extension(None, Some("audio/ogg")), ".ogg");
        // Extensionless filename falls through to the content type.
        assert_eq!(infer_extension(Some("recording"), Some("audio/mp4")), ".mp4");
    }

    #[test]
    fn test_default_extension() {
        assert_eq!(infer_extension(None, None), ".m4a");
        assert_eq!(infer_extension(None, Some("video/webm")), ".m4a");
        assert_eq!(infer_extension(Some("noext"), None), ".m4a");
    }

    #[test]
    fn test_staged_file_written_and_removed_on_drop() {
        let staged = StagedFile::create(b"RIFF fake wav data", ".wav").unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "wav");
        assert_eq!(std::fs::read(&path).unwrap(), b"RIFF fake wav data");

        drop(staged);
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_tolerates_already_deleted_file() {
        let staged = StagedFile::create(b"bytes", ".m4a").unwrap();
        std::fs::remove_file(staged.path()).unwrap();
        // Drop must not panic when the file is already gone.
        drop(staged);
    }

    #[test]
    fn test_overlapping_staged_files_get_distinct_paths() {
        let staged: Vec<StagedFile> = (0..16)
            .map(|i| StagedFile::create(format!("payload-{}", i).as_bytes(), ".wav").unwrap())
            .collect();

        let mut paths: Vec<_> = staged.iter().map(|s| s.path().to_path_buf()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 16);

        // Each file holds its own payload, no cross-contamination.
        for (i, s) in staged.iter().enumerate() {
            assert_eq!(
                std::fs::read(s.path()).unwrap(),
                format!("payload-{}", i).as_bytes()
            );
        }
    }
}
