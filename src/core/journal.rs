//! Append-only run journal.
//!
//! Events are stored as newline-delimited JSON (JSONL), one file shared by
//! all runs, so `tail -f` shows progress live.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;
use uuid::Uuid;

use crate::domain::{JournalEvent, JournalEventType};

/// File name of the journal inside the ledgerscribe home
pub const JOURNAL_FILE: &str = "journal.jsonl";

/// File-based journal using JSONL format
#[derive(Debug, Clone)]
pub struct RunJournal {
    path: PathBuf,
}

impl RunJournal {
    /// Journal at an explicit file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Journal at `<home>/journal.jsonl`
    pub fn in_home(home: &Path) -> Self {
        Self::new(home.join(JOURNAL_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an event to the log
    pub async fn append(&self, event: &JournalEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create journal directory: {}", parent.display())
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open journal: {}", self.path.display()))?;

        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write event")?;
        file.flush().await.context("Failed to flush event")?;

        Ok(())
    }

    /// Append, downgrading failure to a warning.
    ///
    /// The ledger is the source of truth; a lost journal line never fails a run.
    pub async fn record(&self, event: &JournalEvent) {
        if let Err(e) = self.append(event).await {
            warn!(error = %e, event = event.event_type.as_str(), "Failed to record journal event");
        }
    }

    /// Replay all events in order.
    ///
    /// A torn trailing line from an interrupted append is ignored.
    pub async fn replay(&self) -> Result<Vec<JournalEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .await
            .with_context(|| format!("Failed to open journal: {}", self.path.display()))?;

        let mut lines = BufReader::new(file).lines();
        let mut events = Vec::new();
        let mut line_no = 0usize;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalEvent>(&line) {
                Ok(event) => events.push(event),
                Err(e) => warn!(line = line_no, error = %e, "Skipping unreadable journal line"),
            }
        }

        Ok(events)
    }

    /// Events of one run, in order
    pub async fn run_events(&self, run_id: Uuid) -> Result<Vec<JournalEvent>> {
        let events = self.replay().await?;
        Ok(events.into_iter().filter(|e| e.run_id == run_id).collect())
    }

    /// Most recent `limit` run summaries (terminal events), newest first
    pub async fn recent_runs(&self, limit: usize) -> Result<Vec<JournalEvent>> {
        let events = self.replay().await?;
        Ok(events
            .into_iter()
            .rev()
            .filter(|e| {
                matches!(
                    e.event_type,
                    JournalEventType::RunCompleted
                        | JournalEventType::RunFailed
                        | JournalEventType::NothingToDo
                )
            })
            .take(limit)
            .collect())
    }
}
