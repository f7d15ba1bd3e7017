//! Adapter interfaces for the external tools the pipeline drives.
//!
//! Each stage of the pipeline talks to one adapter:
//! - Acquirer: fetch media for an identifier/locator (yt-dlp)
//! - AudioExtractor: derive an audio track from media (ffmpeg)
//! - Transcriber: audio to word-level timed tokens (Whisper CLI)
//!
//! The orchestrator only sees these traits, so tests swap in fakes.

pub mod ffmpeg;
pub mod whisper;
pub mod ytdlp;

use std::io;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::TimedToken;

pub use ffmpeg::{AudioFormat, ExtractionSettings, FfmpegExtractor};
pub use whisper::{ComputeDevice, ComputePrecision, WhisperSettings, WhisperTranscriber};
pub use ytdlp::{AcquisitionSettings, YtDlpAcquirer};

/// Failure of a single adapter call
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Invalid locator '{locator}': {reason}")]
    InvalidLocator { locator: String, reason: String },

    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with code {code}: {stderr}")]
    CommandFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("Expected output was not produced: {path}")]
    MissingOutput { path: PathBuf },

    #[error("Failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },

    #[error("Timed out after {limit:?}")]
    Timeout { limit: Duration },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl AdapterError {
    /// Build a `CommandFailed` from a finished process
    pub fn command_failed(program: &str, output: &Output) -> Self {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Self::CommandFailed {
            program: program.to_string(),
            code: output.status.code().unwrap_or(-1),
            stderr: last_lines(stderr.trim(), 5),
        }
    }
}

/// Fetches one media item
#[async_trait]
pub trait Acquirer: Send + Sync {
    /// Human-readable adapter name
    fn name(&self) -> &str;

    /// Download the item into `destination`, returning the local media path
    async fn acquire(
        &self,
        identifier: &str,
        locator: &str,
        destination: &Path,
    ) -> Result<PathBuf, AdapterError>;

    /// Check the backing tool is available
    async fn health_check(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}

/// Derives an audio track from a media file
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    fn name(&self) -> &str;

    /// File extension of produced audio, without the dot
    fn extension(&self) -> &str;

    async fn extract_audio(
        &self,
        media: &Path,
        destination: &Path,
    ) -> Result<PathBuf, AdapterError>;

    async fn health_check(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}

/// Converts audio into word-level timed tokens.
///
/// Silent audio yields an empty vector, not an error.
#[async_trait]
pub trait Transcriber: Send + Sync {
    fn name(&self) -> &str;

    async fn transcribe(&self, audio: &Path) -> Result<Vec<TimedToken>, AdapterError>;

    async fn health_check(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}

/// Run `<program> --version` (or the given probe args) and require success
pub(crate) async fn probe_binary(program: &str, args: &[&str]) -> Result<(), AdapterError> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| AdapterError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(AdapterError::command_failed(program, &output));
    }
    Ok(())
}

/// Whether a file exists and has content
pub(crate) async fn is_nonempty_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_lines() {
        assert_eq!(last_lines("a\nb\nc", 2), "b | c");
        assert_eq!(last_lines("only", 5), "only");
        assert_eq!(last_lines("", 3), "");
    }

    #[test]
    fn test_error_messages() {
        let err = AdapterError::Timeout {
            limit: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "Timed out after 30s");

        let err = AdapterError::CommandFailed {
            program: "yt-dlp".to_string(),
            code: 1,
            stderr: "ERROR: Video unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "yt-dlp exited with code 1: ERROR: Video unavailable");
    }

    #[tokio::test]
    async fn test_probe_missing_binary() {
        let result = probe_binary("definitely-not-a-real-binary-xyz", &["--version"]).await;
        assert!(matches!(result, Err(AdapterError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_is_nonempty_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let empty = temp.path().join("empty");
        let full = temp.path().join("full");
        tokio::fs::write(&empty, b"").await.unwrap();
        tokio::fs::write(&full, b"data").await.unwrap();

        assert!(!is_nonempty_file(&empty).await);
        assert!(is_nonempty_file(&full).await);
        assert!(!is_nonempty_file(&temp.path().join("missing")).await);
        assert!(!is_nonempty_file(temp.path()).await);
    }
}
