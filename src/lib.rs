//! ledgerscribe - Ledger-driven media transcription pipeline
//!
//! Walks a CSV ledger of media items, and for each pending item downloads
//! the media, extracts its audio, transcribes it with word-level timing,
//! writes the timings to a JSON sidecar and records the result back into
//! the ledger.
//!
//! # Architecture
//!
//! The ledger is the source of truth:
//! - Each run loads it in full and picks the first item not yet acquired
//! - Artifacts are keyed by item identifier, so reruns are deterministic
//! - The sidecar is written before the ledger commit, and the commit is an
//!   atomic file replacement guarded by a content fingerprint
//! - An append-only journal records what each run did
//!
//! # Modules
//!
//! - `adapters`: External tools (yt-dlp, ffmpeg, Whisper)
//! - `core`: Ledger, sidecar writer, journal, limits and the orchestrator
//! - `domain`: Data structures (WorkItem, TimedToken, JournalEvent, RunReport)
//! - `config`: Config file discovery and resolution
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Process the next pending item
//! ledgerscribe --ledger videos.csv run
//!
//! # Check progress
//! ledgerscribe status --verify
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use crate::core::{CsvLedger, LedgerStore, Orchestrator, PipelineError};
pub use domain::{RunOutcome, RunReport, TimedToken, WorkItem};
