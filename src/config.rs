//! Configuration for ledgerscribe.
//!
//! Configuration sources (highest priority first):
//! 1. CLI flags (applied by the caller)
//! 2. Environment variables (LEDGERSCRIBE_HOME, LEDGERSCRIBE_LEDGER, LEDGERSCRIBE_OUTPUT_DIR)
//! 3. Config file (`--config`, LEDGERSCRIBE_CONFIG, or .ledgerscribe/config.yaml)
//! 4. Defaults
//!
//! Config file discovery:
//! - Searches current directory and parents for .ledgerscribe/config.yaml
//! - Paths in config file are relative to the project root (parent of .ledgerscribe/)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::{AcquisitionSettings, ExtractionSettings, WhisperSettings};
use crate::core::{ColumnNames, RunLimits};

/// Directory holding a project's config file
pub const CONFIG_DIR: &str = ".ledgerscribe";

/// Config file name inside [`CONFIG_DIR`]
pub const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_LEDGER: &str = "ledger.csv";
const DEFAULT_OUTPUT_DIR: &str = "output";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub columns: ColumnNames,
    #[serde(default)]
    pub transcription: WhisperSettings,
    #[serde(default)]
    pub acquisition: AcquisitionSettings,
    #[serde(default)]
    pub extraction: ExtractionSettings,
    #[serde(default)]
    pub run: RunLimits,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory holding the journal and lock files
    pub home: Option<String>,
    /// Ledger CSV file
    pub ledger: Option<String>,
    /// Directory for media, audio and sidecar artifacts
    pub output_dir: Option<String>,
}

/// Environment overrides, captured once so resolution stays pure
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub home: Option<PathBuf>,
    pub ledger: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let var = |name: &str| {
            std::env::var_os(name)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };
        Self {
            home: var("LEDGERSCRIBE_HOME"),
            ledger: var("LEDGERSCRIBE_LEDGER"),
            output_dir: var("LEDGERSCRIBE_OUTPUT_DIR"),
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// State directory (journal)
    pub home: PathBuf,
    pub ledger: PathBuf,
    pub output_dir: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub columns: ColumnNames,
    pub transcription: WhisperSettings,
    pub acquisition: AcquisitionSettings,
    pub extraction: ExtractionSettings,
    pub run: RunLimits,
}

impl ResolvedConfig {
    /// Render as YAML for display
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to render configuration")
    }
}

/// Load configuration from all sources.
///
/// `explicit` is the `--config` path; otherwise the file is discovered from
/// the current directory upwards.
pub fn load_config(explicit: Option<&Path>) -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    resolve(explicit, &cwd, &EnvOverrides::from_env())
}

/// Resolve configuration relative to `start_dir` with the given overrides
pub fn resolve(
    explicit: Option<&Path>,
    start_dir: &Path,
    env: &EnvOverrides,
) -> Result<ResolvedConfig> {
    let config_file = match explicit {
        Some(path) => {
            if !path.is_file() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Some(resolve_path(start_dir, &path.to_string_lossy()))
        }
        None => find_config_file(start_dir),
    };

    let (config, base_dir) = match &config_file {
        Some(path) => (load_config_file(path)?, project_root(path)),
        None => (ConfigFile::default(), start_dir.to_path_buf()),
    };

    let home = match (&env.home, &config.paths.home) {
        (Some(home), _) => home.clone(),
        (None, Some(home)) => resolve_path(&base_dir, home),
        (None, None) => default_home()?,
    };

    let ledger = env.ledger.clone().unwrap_or_else(|| {
        resolve_path(&base_dir, config.paths.ledger.as_deref().unwrap_or(DEFAULT_LEDGER))
    });

    let output_dir = env.output_dir.clone().unwrap_or_else(|| {
        resolve_path(
            &base_dir,
            config.paths.output_dir.as_deref().unwrap_or(DEFAULT_OUTPUT_DIR),
        )
    });

    Ok(ResolvedConfig {
        home,
        ledger,
        output_dir,
        config_file,
        columns: config.columns,
        transcription: config.transcription,
        acquisition: config.acquisition,
        extraction: config.extraction,
        run: config.run,
    })
}

/// Default state directory (~/.ledgerscribe)
pub fn default_home() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR))
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.is_file() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Directory relative config paths resolve against
fn project_root(config_path: &Path) -> PathBuf {
    let dir = config_path.parent().unwrap_or(Path::new("."));
    if dir.file_name().map(|n| n == CONFIG_DIR).unwrap_or(false) {
        dir.parent().unwrap_or(dir).to_path_buf()
    } else {
        dir.to_path_buf()
    }
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    if content.trim().is_empty() {
        return Ok(ConfigFile::default());
    }

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}
