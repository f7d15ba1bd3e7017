//! Run state machine stages and the report produced by one run.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// States an item passes through within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Selecting,
    Acquiring,
    Extracting,
    Transcribing,
    WritingSidecar,
    Committing,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Selecting => "selecting",
            Self::Acquiring => "acquiring",
            Self::Extracting => "extracting",
            Self::Transcribing => "transcribing",
            Self::WritingSidecar => "writing_sidecar",
            Self::Committing => "committing",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// No eligible item existed; the ledger was not written
    NothingToDo,

    /// At least one item was committed
    Completed,

    /// Eligible items existed but every attempted one was skipped
    Exhausted,
}

/// An item committed to the ledger during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommittedItem {
    pub identifier: String,
    pub media_path: PathBuf,
    pub audio_path: PathBuf,
    pub sidecar_path: PathBuf,
    pub token_count: usize,
    pub duration_ms: u64,
}

/// An item left pending because one of its stages failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedItem {
    pub identifier: String,
    pub stage: Stage,
    pub error: String,
}

/// Summary of a single orchestrator invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub outcome: Option<RunOutcome>,
    pub committed: Vec<CommittedItem>,
    pub skipped: Vec<SkippedItem>,
}

impl RunReport {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            completed_at: None,
            outcome: None,
            committed: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Close the report with its final outcome
    pub fn finish(&mut self, outcome: RunOutcome) {
        self.outcome = Some(outcome);
        self.completed_at = Some(Utc::now());
    }

    pub fn is_nothing_to_do(&self) -> bool {
        self.outcome == Some(RunOutcome::NothingToDo)
    }
}
