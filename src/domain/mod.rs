//! Domain types for the ledgerscribe pipeline.
//!
//! This module contains the core data structures:
//! - WorkItem: one ledger row and its status fields
//! - TimedToken: word-level transcription output
//! - JournalEvent: immutable records of run progress
//! - RunReport: what a single run did

pub mod events;
pub mod item;
pub mod run;
pub mod token;

// Re-export commonly used types
pub use events::{JournalEvent, JournalEventType};
pub use item::{AcquisitionStatus, SidecarStatus, TranscriptionStatus, WorkItem};
pub use run::{CommittedItem, RunOutcome, RunReport, SkippedItem, Stage};
pub use token::{join_transcript, TimedToken};
