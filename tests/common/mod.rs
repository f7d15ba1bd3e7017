//! Fake adapters and ledger fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ledgerscribe::adapters::{Acquirer, AdapterError, AudioExtractor, Transcriber};
use ledgerscribe::core::{ColumnNames, CsvLedger, Orchestrator, RunLimits};
use ledgerscribe::domain::TimedToken;
use tempfile::TempDir;

pub const HEADER: &str =
    "identifier,locator,acquisition_status,transcription_status,transcript_text,sidecar_status";

/// Shared record of which identifiers an adapter was called with
pub type CallLog = Arc<Mutex<Vec<String>>>;

fn failure(what: &str) -> AdapterError {
    AdapterError::CommandFailed {
        program: what.to_string(),
        code: 1,
        stderr: format!("{} failed", what),
    }
}

/// Writes `<dest>/<id>.mp4`, failing for selected identifiers
#[derive(Default)]
pub struct FakeAcquirer {
    pub fail_for: HashSet<String>,
    pub calls: CallLog,
}

impl FakeAcquirer {
    pub fn failing(ids: &[&str]) -> Self {
        Self {
            fail_for: ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Acquirer for FakeAcquirer {
    fn name(&self) -> &str {
        "fake-acquirer"
    }

    async fn acquire(
        &self,
        identifier: &str,
        locator: &str,
        destination: &Path,
    ) -> Result<PathBuf, AdapterError> {
        self.calls.lock().unwrap().push(identifier.to_string());
        if self.fail_for.contains(identifier) {
            return Err(failure("acquire"));
        }
        tokio::fs::create_dir_all(destination).await?;
        let path = destination.join(format!("{}.mp4", identifier));
        tokio::fs::write(&path, format!("media for {}", locator)).await?;
        Ok(path)
    }
}

/// Copies media bytes to the destination, failing for selected identifiers
#[derive(Default)]
pub struct FakeExtractor {
    pub fail_for: HashSet<String>,
}

impl FakeExtractor {
    pub fn failing(ids: &[&str]) -> Self {
        Self {
            fail_for: ids.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl AudioExtractor for FakeExtractor {
    fn name(&self) -> &str {
        "fake-extractor"
    }

    fn extension(&self) -> &str {
        "mp3"
    }

    async fn extract_audio(
        &self,
        media: &Path,
        destination: &Path,
    ) -> Result<PathBuf, AdapterError> {
        let stem = media.file_stem().unwrap().to_string_lossy().to_string();
        if self.fail_for.contains(&stem) {
            return Err(failure("extract"));
        }
        tokio::fs::copy(media, destination).await?;
        Ok(destination.to_path_buf())
    }
}

/// Returns fixed tokens, optionally failing or stalling
#[derive(Default)]
pub struct FakeTranscriber {
    pub tokens: Vec<TimedToken>,
    pub fail: bool,
    pub delay: Option<Duration>,
    pub calls: CallLog,
}

impl FakeTranscriber {
    pub fn saying(words: &[&str]) -> Self {
        let tokens = words
            .iter()
            .enumerate()
            .map(|(i, w)| TimedToken::new(*w, i as f64 * 0.5, i as f64 * 0.5 + 0.4))
            .collect();
        Self {
            tokens,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    fn name(&self) -> &str {
        "fake-transcriber"
    }

    async fn transcribe(&self, audio: &Path) -> Result<Vec<TimedToken>, AdapterError> {
        self.calls
            .lock()
            .unwrap()
            .push(audio.file_stem().unwrap().to_string_lossy().to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(failure("transcribe"));
        }
        Ok(self.tokens.clone())
    }
}

/// Temp workspace with a ledger file and an output directory
pub struct Workspace {
    pub temp: TempDir,
    pub ledger_path: PathBuf,
    pub output_dir: PathBuf,
}

impl Workspace {
    /// Ledger with the default header and one pending row per identifier
    pub fn with_pending(ids: &[&str]) -> Self {
        let mut csv = format!("{}\n", HEADER);
        for id in ids {
            csv.push_str(&format!("{},https://example.com/watch?v={},,,,\n", id, id));
        }
        Self::with_csv(&csv)
    }

    pub fn with_csv(csv: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let ledger_path = temp.path().join("ledger.csv");
        std::fs::write(&ledger_path, csv).unwrap();
        let output_dir = temp.path().join("output");
        Self {
            temp,
            ledger_path,
            output_dir,
        }
    }

    pub fn store(&self) -> CsvLedger {
        CsvLedger::new(&self.ledger_path, ColumnNames::default())
    }

    pub fn ledger_bytes(&self) -> Vec<u8> {
        std::fs::read(&self.ledger_path).unwrap()
    }

    pub fn orchestrator(
        &self,
        acquirer: FakeAcquirer,
        extractor: FakeExtractor,
        transcriber: FakeTranscriber,
        limits: RunLimits,
    ) -> Orchestrator {
        Orchestrator::new(
            Box::new(acquirer),
            Box::new(extractor),
            Box::new(transcriber),
            &self.output_dir,
            limits,
        )
    }

    /// Orchestrator whose adapters all succeed, saying "hi there"
    pub fn happy_orchestrator(&self) -> Orchestrator {
        self.orchestrator(
            FakeAcquirer::default(),
            FakeExtractor::default(),
            FakeTranscriber::saying(&["hi", "there"]),
            RunLimits::default(),
        )
    }
}
