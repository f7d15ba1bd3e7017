//! Run orchestrator: drives ledger items through the pipeline stages.
//!
//! One run loads the ledger, picks the first eligible item, and takes it
//! through acquisition, audio extraction, transcription and the sidecar
//! write before committing its status fields back to the ledger. The sidecar
//! write always precedes the commit; a failure anywhere before the commit
//! leaves the durable ledger untouched.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{Acquirer, AdapterError, AudioExtractor, Transcriber};
use crate::domain::{
    join_transcript, CommittedItem, JournalEvent, JournalEventType, RunOutcome, RunReport,
    SkippedItem, Stage, TimedToken, WorkItem,
};

use super::journal::RunJournal;
use super::ledger::{LedgerError, LedgerStore};
use super::safety::{bounded, FailurePolicy, RunLimits};
use super::sidecar::{artifact_path, SidecarError, SidecarWriter};

/// A failed run, classified by the stage that failed
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Acquisition failed for '{id}': {source}")]
    Acquisition {
        id: String,
        #[source]
        source: AdapterError,
    },

    #[error("Audio extraction failed for '{id}': {source}")]
    Extraction {
        id: String,
        #[source]
        source: AdapterError,
    },

    #[error("Transcription failed for '{id}': {source}")]
    Transcription {
        id: String,
        #[source]
        source: AdapterError,
    },

    #[error("Sidecar write failed for '{id}': {source}")]
    SidecarWrite {
        id: String,
        #[source]
        source: SidecarError,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl PipelineError {
    /// Stage the failure happened in
    pub fn stage(&self) -> Stage {
        match self {
            Self::Acquisition { .. } => Stage::Acquiring,
            Self::Extraction { .. } => Stage::Extracting,
            Self::Transcription { .. } => Stage::Transcribing,
            Self::SidecarWrite { .. } => Stage::WritingSidecar,
            Self::Ledger(_) => Stage::Committing,
        }
    }

    /// Whether the run may skip the item and keep scanning.
    ///
    /// Acquisition failures always skip; ledger failures never do.
    pub fn is_recoverable(&self, policy: FailurePolicy) -> bool {
        match self {
            Self::Acquisition { .. } => true,
            Self::Ledger(_) => false,
            _ => policy == FailurePolicy::Skip,
        }
    }
}

/// Artifacts produced for one item before commit
struct ProcessedItem {
    media_path: PathBuf,
    audio_path: PathBuf,
    sidecar_path: PathBuf,
    tokens: Vec<TimedToken>,
}

/// Pipeline orchestrator
pub struct Orchestrator {
    acquirer: Box<dyn Acquirer>,
    extractor: Box<dyn AudioExtractor>,
    transcriber: Box<dyn Transcriber>,
    sidecars: SidecarWriter,
    output_dir: PathBuf,
    limits: RunLimits,
    journal: Option<RunJournal>,
}

impl Orchestrator {
    /// Create an orchestrator writing every artifact into `output_dir`
    pub fn new(
        acquirer: Box<dyn Acquirer>,
        extractor: Box<dyn AudioExtractor>,
        transcriber: Box<dyn Transcriber>,
        output_dir: impl Into<PathBuf>,
        limits: RunLimits,
    ) -> Self {
        let output_dir = output_dir.into();
        Self {
            acquirer,
            extractor,
            transcriber,
            sidecars: SidecarWriter::new(&output_dir),
            output_dir,
            limits,
            journal: None,
        }
    }

    /// Record run events to `journal`
    pub fn with_journal(mut self, journal: RunJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Execute one run against the ledger
    #[instrument(
        skip(self, store),
        fields(run_id = tracing::field::Empty, ledger = %store.location())
    )]
    pub async fn run(&self, store: &dyn LedgerStore) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        info!("Starting run");

        let mut report = RunReport::new(run_id);
        self.record(JournalEvent::run(
            run_id,
            JournalEventType::RunStarted,
            format!("Run started on {}", store.location()),
        ))
        .await;

        match self.execute(store, &mut report).await {
            Ok(outcome) => {
                report.finish(outcome);
                if outcome != RunOutcome::NothingToDo {
                    self.record(JournalEvent::run(
                        run_id,
                        JournalEventType::RunCompleted,
                        format!(
                            "Run finished: {} committed, {} skipped",
                            report.committed.len(),
                            report.skipped.len()
                        ),
                    ))
                    .await;
                }
                info!(
                    outcome = ?outcome,
                    committed = report.committed.len(),
                    skipped = report.skipped.len(),
                    "Run finished"
                );
                Ok(report)
            }
            Err(e) => {
                error!(stage = %e.stage(), error = %e, "Run aborted");
                self.record(
                    JournalEvent::run(
                        run_id,
                        JournalEventType::RunFailed,
                        "Run aborted".to_string(),
                    )
                    .with_error(e.to_string()),
                )
                .await;
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        store: &dyn LedgerStore,
        report: &mut RunReport,
    ) -> Result<RunOutcome, PipelineError> {
        let run_id = report.run_id;
        let mut ledger = store.load()?;

        if ledger.find_first_eligible().is_none() {
            info!(items = ledger.len(), "Nothing to do: every item has been acquired");
            self.record(JournalEvent::run(
                run_id,
                JournalEventType::NothingToDo,
                "No eligible items".to_string(),
            ))
            .await;
            return Ok(RunOutcome::NothingToDo);
        }

        let max_items = self.limits.max_items_per_run.max(1);
        let mut excluded: HashSet<usize> = HashSet::new();

        while report.committed.len() < max_items {
            let Some(index) = ledger.find_first_eligible_excluding(&excluded) else {
                break;
            };
            let item = ledger.items()[index].clone();
            let started = Instant::now();

            let processed = match self.process_item(run_id, &item).await {
                Ok(processed) => processed,
                Err(e) if e.is_recoverable(self.limits.failure_policy) => {
                    warn!(item = %item.identifier, stage = %e.stage(), error = %e, "Skipping item");
                    self.record(
                        JournalEvent::item(
                            run_id,
                            &item.identifier,
                            e.stage(),
                            JournalEventType::ItemSkipped,
                            format!("Skipped '{}'", item.identifier),
                        )
                        .with_error(e.to_string()),
                    )
                    .await;
                    report.skipped.push(SkippedItem {
                        identifier: item.identifier.clone(),
                        stage: e.stage(),
                        error: e.to_string(),
                    });
                    excluded.insert(index);
                    continue;
                }
                Err(e) => return Err(e),
            };

            // COMMITTING
            let transcript = join_transcript(&processed.tokens);
            ledger.commit(index, transcript)?;
            store.save(&mut ledger)?;

            let duration_ms = started.elapsed().as_millis() as u64;
            info!(
                item = %item.identifier,
                sidecar = %processed.sidecar_path.display(),
                tokens = processed.tokens.len(),
                elapsed_ms = duration_ms,
                "Committed to ledger"
            );
            self.record(
                JournalEvent::item(
                    run_id,
                    &item.identifier,
                    Stage::Committing,
                    JournalEventType::ItemCommitted,
                    format!("Committed '{}'", item.identifier),
                )
                .with_duration(duration_ms),
            )
            .await;

            report.committed.push(CommittedItem {
                identifier: item.identifier.clone(),
                media_path: processed.media_path,
                audio_path: processed.audio_path,
                sidecar_path: processed.sidecar_path,
                token_count: processed.tokens.len(),
                duration_ms,
            });
        }

        Ok(if report.committed.is_empty() {
            RunOutcome::Exhausted
        } else {
            RunOutcome::Completed
        })
    }

    /// ACQUIRING through WRITING_SIDECAR for one item
    async fn process_item(
        &self,
        run_id: Uuid,
        item: &WorkItem,
    ) -> Result<ProcessedItem, PipelineError> {
        let id = item.identifier.as_str();
        let timeouts = &self.limits.timeouts;

        let started = Instant::now();
        let media_path = bounded(
            timeouts.acquire(),
            self.acquirer.acquire(id, &item.locator, &self.output_dir),
        )
        .await
        .map_err(|source| PipelineError::Acquisition {
            id: id.to_string(),
            source,
        })?;
        self.stage_completed(run_id, id, Stage::Acquiring, &media_path, started).await;

        let started = Instant::now();
        let audio_target = artifact_path(&self.output_dir, id, self.extractor.extension());
        let audio_path = bounded(
            timeouts.extract(),
            self.extractor.extract_audio(&media_path, &audio_target),
        )
        .await
        .map_err(|source| PipelineError::Extraction {
            id: id.to_string(),
            source,
        })?;
        self.stage_completed(run_id, id, Stage::Extracting, &audio_path, started).await;

        let started = Instant::now();
        let tokens = bounded(timeouts.transcribe(), self.transcriber.transcribe(&audio_path))
            .await
            .map_err(|source| PipelineError::Transcription {
                id: id.to_string(),
                source,
            })?;
        self.stage_completed(run_id, id, Stage::Transcribing, &audio_path, started).await;

        let started = Instant::now();
        let (sidecar_path, tokens) = self.write_sidecar(id, tokens).await?;
        self.stage_completed(run_id, id, Stage::WritingSidecar, &sidecar_path, started).await;

        Ok(ProcessedItem {
            media_path,
            audio_path,
            sidecar_path,
            tokens,
        })
    }

    /// Sidecar serialization and the atomic rename run on the blocking pool
    async fn write_sidecar(
        &self,
        id: &str,
        tokens: Vec<TimedToken>,
    ) -> Result<(PathBuf, Vec<TimedToken>), PipelineError> {
        let writer = self.sidecars.clone();
        let identifier = id.to_string();
        let written = tokio::task::spawn_blocking(move || {
            writer.write(&identifier, &tokens).map(|path| (path, tokens))
        })
        .await
        .map_err(|e| SidecarError::Write {
            path: self.sidecars.path_for(id),
            source: io::Error::new(io::ErrorKind::Other, e.to_string()),
        })
        .and_then(|result| result);

        written.map_err(|source| PipelineError::SidecarWrite {
            id: id.to_string(),
            source,
        })
    }

    async fn stage_completed(
        &self,
        run_id: Uuid,
        id: &str,
        stage: Stage,
        path: &Path,
        started: Instant,
    ) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(item = %id, stage = %stage, path = %path.display(), elapsed_ms, "Stage complete");
        self.record(
            JournalEvent::item(
                run_id,
                id,
                stage,
                JournalEventType::StageCompleted,
                format!("{} -> {}", stage, path.display()),
            )
            .with_duration(elapsed_ms),
        )
        .await;
    }

    async fn record(&self, event: JournalEvent) {
        if let Some(journal) = &self.journal {
            journal.record(&event).await;
        }
    }
}

/// The item the next run would pick, without touching anything
pub fn select_next(store: &dyn LedgerStore) -> Result<Option<WorkItem>, LedgerError> {
    let ledger = store.load()?;
    Ok(ledger
        .find_first_eligible()
        .map(|index| ledger.items()[index].clone()))
}
