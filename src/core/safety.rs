//! Run limits: stage timeouts, the per-run item cap and the failure policy.
//!
//! Every adapter call is bounded by its stage timeout; an expired call is
//! reported exactly like an adapter error.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::AdapterError;

/// Per-stage adapter timeouts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimeouts {
    /// Media download (default: 1800 = 30 min)
    #[serde(default = "default_acquire_timeout")]
    pub acquire_seconds: u64,

    /// Audio extraction (default: 900 = 15 min)
    #[serde(default = "default_extract_timeout")]
    pub extract_seconds: u64,

    /// Speech-to-text (default: 7200 = 2 hours)
    #[serde(default = "default_transcribe_timeout")]
    pub transcribe_seconds: u64,
}

fn default_acquire_timeout() -> u64 {
    1800
}
fn default_extract_timeout() -> u64 {
    900
}
fn default_transcribe_timeout() -> u64 {
    7200
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            acquire_seconds: default_acquire_timeout(),
            extract_seconds: default_extract_timeout(),
            transcribe_seconds: default_transcribe_timeout(),
        }
    }
}

impl StageTimeouts {
    pub fn acquire(&self) -> Duration {
        Duration::from_secs(self.acquire_seconds)
    }

    pub fn extract(&self) -> Duration {
        Duration::from_secs(self.extract_seconds)
    }

    pub fn transcribe(&self) -> Duration {
        Duration::from_secs(self.transcribe_seconds)
    }
}

/// What a failed extraction, transcription or sidecar write does to the run.
///
/// Acquisition failures always skip the item; ledger failures always abort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the run, propagating the error
    #[default]
    Strict,

    /// Log, leave the item pending and keep scanning
    Skip,
}

/// Limits applied to one orchestrator run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLimits {
    /// Items committed before the run stops (default: 1)
    #[serde(default = "default_max_items")]
    pub max_items_per_run: usize,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    #[serde(default)]
    pub timeouts: StageTimeouts,
}

fn default_max_items() -> usize {
    1
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_items_per_run: default_max_items(),
            failure_policy: FailurePolicy::default(),
            timeouts: StageTimeouts::default(),
        }
    }
}

/// Run an adapter future, turning expiry into [`AdapterError::Timeout`]
pub async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, AdapterError>
where
    F: Future<Output = Result<T, AdapterError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AdapterError::Timeout { limit }),
    }
}
