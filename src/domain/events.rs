//! Journal events recorded for every run.
//!
//! The ledger holds the current state of each item; the journal is the
//! append-only history of how runs got there.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::run::Stage;

/// A single entry in the append-only run journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Ledger identifier of the item (run-level events have none)
    pub item_id: Option<String>,

    /// Pipeline stage the event refers to
    pub stage: Option<Stage>,

    pub event_type: JournalEventType,

    /// Idempotency key format: "{run_id}:{item_id}:{stage}"
    pub idempotency_key: String,

    /// Human-readable summary
    pub summary: String,

    /// Time taken in milliseconds (for completed stages)
    pub duration_ms: Option<u64>,

    /// Error message if failed or skipped
    pub error: Option<String>,
}

impl JournalEvent {
    /// Create a run-level event with the current timestamp
    pub fn run(run_id: Uuid, event_type: JournalEventType, summary: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            item_id: None,
            stage: None,
            event_type,
            idempotency_key: format!("{}:{}", run_id, event_type.as_str()),
            summary,
            duration_ms: None,
            error: None,
        }
    }

    /// Create an item-level event for a stage
    pub fn item(
        run_id: Uuid,
        item_id: &str,
        stage: Stage,
        event_type: JournalEventType,
        summary: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            item_id: Some(item_id.to_string()),
            stage: Some(stage),
            event_type,
            idempotency_key: item_key(run_id, item_id, stage),
            summary,
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

/// Idempotency key for one stage of one item within a run
pub fn item_key(run_id: Uuid, item_id: &str, stage: Stage) -> String {
    format!("{}:{}:{}", run_id, item_id, stage.as_str())
}

/// Types of journal events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalEventType {
    RunStarted,

    /// No eligible item existed at selection time
    NothingToDo,

    StageCompleted,

    /// A stage failed and the item was left pending for a later run
    ItemSkipped,

    /// The item's status fields were persisted to the ledger
    ItemCommitted,

    RunCompleted,

    RunFailed,
}

impl JournalEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunStarted => "run_started",
            Self::NothingToDo => "nothing_to_do",
            Self::StageCompleted => "stage_completed",
            Self::ItemSkipped => "item_skipped",
            Self::ItemCommitted => "item_committed",
            Self::RunCompleted => "run_completed",
            Self::RunFailed => "run_failed",
        }
    }
}
