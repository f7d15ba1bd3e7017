//! Speech-to-text via the whisper-ctranslate2 CLI.
//!
//! Runs with word timestamps enabled and JSON output into a temp dir, then
//! flattens `segments[].words[]` into timed tokens.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use super::{is_nonempty_file, probe_binary, AdapterError, Transcriber};
use crate::domain::TimedToken;

/// Numeric precision of the model weights
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ComputePrecision {
    #[default]
    Int8,
    Int8Float16,
    Float16,
    Float32,
}

impl ComputePrecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputePrecision::Int8 => "int8",
            ComputePrecision::Int8Float16 => "int8_float16",
            ComputePrecision::Float16 => "float16",
            ComputePrecision::Float32 => "float32",
        }
    }
}

/// Where inference runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    Auto,
    #[default]
    Cpu,
    Cuda,
}

impl ComputeDevice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeDevice::Auto => "auto",
            ComputeDevice::Cpu => "cpu",
            ComputeDevice::Cuda => "cuda",
        }
    }
}

/// Transcription settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhisperSettings {
    /// Binary name or path (default: whisper-ctranslate2)
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Model size or path (default: large)
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub precision: ComputePrecision,

    #[serde(default)]
    pub device: ComputeDevice,

    #[serde(default = "default_beam_size")]
    pub beam_size: u32,

    /// Spoken language; detected when unset
    #[serde(default)]
    pub language: Option<String>,
}

fn default_binary() -> String {
    "whisper-ctranslate2".to_string()
}

fn default_model() -> String {
    "large".to_string()
}

fn default_beam_size() -> u32 {
    5
}

impl Default for WhisperSettings {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            model: default_model(),
            precision: ComputePrecision::default(),
            device: ComputeDevice::default(),
            beam_size: default_beam_size(),
            language: None,
        }
    }
}

/// Whisper JSON output, only the parts we read
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    #[serde(default)]
    words: Vec<WhisperWord>,
}

#[derive(Debug, Deserialize)]
struct WhisperWord {
    word: String,
    start: f64,
    end: f64,
}

/// Transcriber backed by whisper-ctranslate2
#[derive(Debug, Clone, Default)]
pub struct WhisperTranscriber {
    settings: WhisperSettings,
}

impl WhisperTranscriber {
    pub fn new(settings: WhisperSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &WhisperSettings {
        &self.settings
    }

    fn build_args(&self, audio: &Path, output_dir: &Path) -> Vec<String> {
        let mut args = vec![
            audio.to_string_lossy().into_owned(),
            "--model".to_string(),
            self.settings.model.clone(),
            "--device".to_string(),
            self.settings.device.as_str().to_string(),
            "--compute_type".to_string(),
            self.settings.precision.as_str().to_string(),
            "--beam_size".to_string(),
            self.settings.beam_size.to_string(),
            "--word_timestamps".to_string(),
            "True".to_string(),
            "--output_format".to_string(),
            "json".to_string(),
            "--output_dir".to_string(),
            output_dir.to_string_lossy().into_owned(),
        ];

        if let Some(language) = &self.settings.language {
            args.extend(["--language".to_string(), language.clone()]);
        }

        args
    }
}

/// Flatten whisper JSON into ordered tokens.
///
/// Words are trimmed and blank ones dropped.
pub fn parse_tokens(json: &str) -> Result<Vec<TimedToken>, AdapterError> {
    let output: WhisperOutput = serde_json::from_str(json).map_err(|e| AdapterError::Parse {
        what: "whisper output".to_string(),
        reason: e.to_string(),
    })?;

    Ok(output
        .segments
        .into_iter()
        .flat_map(|segment| segment.words)
        .filter_map(|w| {
            let word = w.word.trim();
            if word.is_empty() {
                None
            } else {
                Some(TimedToken::new(word, w.start, w.end))
            }
        })
        .collect())
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    fn name(&self) -> &str {
        "whisper"
    }

    async fn transcribe(&self, audio: &Path) -> Result<Vec<TimedToken>, AdapterError> {
        if !is_nonempty_file(audio).await {
            return Err(AdapterError::MissingOutput {
                path: audio.to_path_buf(),
            });
        }

        let temp_dir = tempfile::tempdir()?;

        debug!(model = %self.settings.model, audio = %audio.display(), "Running whisper");

        let output = Command::new(&self.settings.binary)
            .args(self.build_args(audio, temp_dir.path()))
            .stdout(Stdio::piped())
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

        let stem = audio.file_stem().unwrap_or_default().to_string_lossy();
        let json_path = temp_dir.path().join(format!("{}.json", stem));
        if !json_path.exists() {
            return Err(AdapterError::MissingOutput { path: json_path });
        }

        let json = tokio::fs::read_to_string(&json_path).await?;
        parse_tokens(&json)
    }

    async fn health_check(&self) -> Result<(), AdapterError> {
        probe_binary(&self.settings.binary, &["--help"]).await
    }
}
