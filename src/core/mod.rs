//! Core pipeline logic.
//!
//! This module contains:
//! - Ledger: CSV-backed source of truth with atomic, fingerprinted saves
//! - Sidecar: per-item word timing artifacts
//! - Journal: append-only run history
//! - Safety: stage timeouts, item cap and failure policy
//! - Orchestrator: the per-run state machine

pub mod journal;
pub mod ledger;
pub mod orchestrator;
pub mod safety;
pub mod sidecar;

// Re-export commonly used types
pub use journal::RunJournal;
pub use ledger::{
    ColumnNames, CsvLedger, Ledger, LedgerCounts, LedgerError, LedgerLock, LedgerStore,
};
pub use orchestrator::{select_next, Orchestrator, PipelineError};
pub use safety::{bounded, FailurePolicy, RunLimits, StageTimeouts};
pub use sidecar::{artifact_path, SidecarError, SidecarWriter};
