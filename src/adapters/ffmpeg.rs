//! Audio extraction via ffmpeg.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use super::{is_nonempty_file, probe_binary, AdapterError, AudioExtractor};

/// Audio container produced by extraction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
    Flac,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
        }
    }

    /// ffmpeg encoder for this format
    pub fn ffmpeg_codec(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "libmp3lame",
            AudioFormat::Wav => "pcm_s16le",
            AudioFormat::Flac => "flac",
        }
    }
}

/// ffmpeg settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSettings {
    /// Binary name or path (default: ffmpeg)
    #[serde(default = "default_binary")]
    pub binary: String,

    #[serde(default)]
    pub format: AudioFormat,
}

fn default_binary() -> String {
    "ffmpeg".to_string()
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            format: AudioFormat::default(),
        }
    }
}

/// Extractor backed by the ffmpeg CLI
#[derive(Debug, Clone, Default)]
pub struct FfmpegExtractor {
    settings: ExtractionSettings,
}

impl FfmpegExtractor {
    pub fn new(settings: ExtractionSettings) -> Self {
        Self { settings }
    }

    fn build_args(&self, media: &Path, destination: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            media.to_string_lossy().into_owned(),
            "-vn".to_string(),
            "-c:a".to_string(),
            self.settings.format.ffmpeg_codec().to_string(),
            destination.to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl AudioExtractor for FfmpegExtractor {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn extension(&self) -> &str {
        self.settings.format.extension()
    }

    async fn extract_audio(
        &self,
        media: &Path,
        destination: &Path,
    ) -> Result<PathBuf, AdapterError> {
        if !is_nonempty_file(media).await {
            return Err(AdapterError::MissingOutput {
                path: media.to_path_buf(),
            });
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let output = Command::new(&self.settings.binary)
            .args(self.build_args(media, destination))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| AdapterError::Spawn {
                program: self.settings.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(AdapterError::command_failed(&self.settings.binary, &output));
        }

        if !is_nonempty_file(destination).await {
            return Err(AdapterError::MissingOutput {
                path: destination.to_path_buf(),
            });
        }

        Ok(destination.to_path_buf())
    }

    async fn health_check(&self) -> Result<(), AdapterError> {
        probe_binary(&self.settings.binary, &["-version"]).await
    }
}
