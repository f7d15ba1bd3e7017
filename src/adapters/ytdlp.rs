//! Media acquisition via yt-dlp.
//!
//! Downloads the first mp4 rendition of a locator to `<dest>/<identifier>.mp4`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use super::{is_nonempty_file, probe_binary, Acquirer, AdapterError};

/// Container extension of acquired media
pub const MEDIA_EXTENSION: &str = "mp4";

/// yt-dlp settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionSettings {
    /// Binary name or path (default: yt-dlp)
    #[serde(default = "default_binary")]
    pub binary: String,

    /// yt-dlp format selector
    #[serde(default = "default_format")]
    pub format: String,

    /// Reuse a non-empty media file left by an earlier run
    #[serde(default = "default_reuse")]
    pub reuse_existing: bool,
}

fn default_binary() -> String {
    "yt-dlp".to_string()
}

fn default_format() -> String {
    "best[ext=mp4]/mp4".to_string()
}

fn default_reuse() -> bool {
    true
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            format: default_format(),
            reuse_existing: default_reuse(),
        }
    }
}

/// Acquirer backed by the yt-dlp CLI
#[derive(Debug, Clone)]
pub struct YtDlpAcquirer {
    settings: AcquisitionSettings,
}

impl YtDlpAcquirer {
    pub fn new(settings: AcquisitionSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AcquisitionSettings {
        &self.settings
    }

    fn build_args(&self, locator: &str, output: &Path) -> Vec<String> {
        vec![
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            "--format".to_string(),
            self.settings.format.clone(),
            "--output".to_string(),
            output.to_string_lossy().into_owned(),
            "--".to_string(),
            locator.to_string(),
        ]
    }
}

impl Default for YtDlpAcquirer {
    fn default() -> Self {
        Self::new(AcquisitionSettings::default())
    }
}

#[async_trait]
impl Acquirer for YtDlpAcquirer {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn acquire(
        &self,
        identifier: &str,
        locator: &str,
        destination: &Path,
    ) -> Result<PathBuf, AdapterError> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(AdapterError::InvalidLocator {
                locator: locator.to_string(),
                reason: "locator is empty".to_string(),
            });
        }

        let output = destination.join(format!("{}.{}", identifier, MEDIA_EXTENSION));
        if self.settings.reuse_existing && is_nonempty_file(&output).await {
            debug!(path = %output.display(), "Reusing previously acquired media");
            return Ok(output);
        }

        tokio::fs::create_dir_all(destination).await?;

        let result = Command::new(&self.settings.binary)
            .args(self.build_args(locator, &output))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| AdapterError::Spawn {
                program: self.settings.binary.clone(),
                source,
            })?;

        if !result.status.success() {
            return Err(AdapterError::command_failed(&self.settings.binary, &result));
        }

        if !is_nonempty_file(&output).await {
            return Err(AdapterError::MissingOutput { path: output });
        }

        Ok(output)
    }

    async fn health_check(&self) -> Result<(), AdapterError> {
        probe_binary(&self.settings.binary, &["--version"]).await
    }
}
