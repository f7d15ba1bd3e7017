//! Sidecar artifacts: word-level timing for each transcribed item.
//!
//! One JSON file per identifier at `<dir>/<identifier>.json`, holding an
//! ordered list of `{word, start, end}` records. Files are written to a temp
//! file in the same directory and renamed into place, so readers never see
//! a truncated artifact.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

use crate::domain::TimedToken;

/// File extension of sidecar artifacts
pub const SIDECAR_EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum SidecarError {
    #[error("Failed to serialize sidecar for '{identifier}': {source}")]
    Serialize {
        identifier: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write sidecar {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read sidecar {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Sidecar {path} is empty")]
    Empty { path: PathBuf },

    #[error("Sidecar {path} is not valid JSON: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Writes and reads sidecar artifacts in one directory
#[derive(Debug, Clone)]
pub struct SidecarWriter {
    dir: PathBuf,
}

impl SidecarWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Canonical artifact path for an identifier
    pub fn path_for(&self, identifier: &str) -> PathBuf {
        artifact_path(&self.dir, identifier, SIDECAR_EXTENSION)
    }

    /// Serialize `tokens` to the identifier's artifact, all or nothing
    pub fn write(&self, identifier: &str, tokens: &[TimedToken]) -> Result<PathBuf, SidecarError> {
        let path = self.path_for(identifier);
        let write_err = |source: io::Error| SidecarError::Write {
            path: path.clone(),
            source,
        };

        let json = serde_json::to_vec_pretty(tokens).map_err(|source| SidecarError::Serialize {
            identifier: identifier.to_string(),
            source,
        })?;

        fs::create_dir_all(&self.dir).map_err(write_err)?;

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(write_err)?;
        tmp.write_all(&json).map_err(write_err)?;
        tmp.write_all(b"\n").map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&path).map_err(|e| write_err(e.error))?;

        Ok(path)
    }

    /// Read an artifact back; fails if it is missing, empty or unparseable
    pub fn read(&self, identifier: &str) -> Result<Vec<TimedToken>, SidecarError> {
        let path = self.path_for(identifier);
        let content = fs::read(&path).map_err(|source| SidecarError::Read {
            path: path.clone(),
            source,
        })?;

        if content.iter().all(u8::is_ascii_whitespace) {
            return Err(SidecarError::Empty { path });
        }

        serde_json::from_slice(&content).map_err(|source| SidecarError::Invalid { path, source })
    }

    /// Check the artifact exists and is valid
    pub fn verify(&self, identifier: &str) -> Result<usize, SidecarError> {
        self.read(identifier).map(|tokens| tokens.len())
    }
}

/// `<dir>/<identifier>.<extension>`, independent of anything else about the item
pub fn artifact_path(dir: &Path, identifier: &str, extension: &str) -> PathBuf {
    dir.join(format!("{}.{}", identifier, extension))
}
