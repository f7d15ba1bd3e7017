//! Orchestrator Integration Tests
//!
//! Runs the full state machine against a real CSV ledger with fake adapters.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{FakeAcquirer, FakeExtractor, FakeTranscriber, Workspace};
use ledgerscribe::core::{
    FailurePolicy, LedgerStore, PipelineError, RunLimits, SidecarWriter, StageTimeouts,
};
use ledgerscribe::domain::{
    AcquisitionStatus, RunOutcome, SidecarStatus, Stage, TranscriptionStatus,
};
use ledgerscribe::adapters::AdapterError;

fn skip_policy() -> RunLimits {
    RunLimits {
        failure_policy: FailurePolicy::Skip,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_commits_first_eligible_item() {
    let ws = Workspace::with_pending(&["abc123"]);
    let store = ws.store();

    let report = ws.happy_orchestrator().run(&store).await.unwrap();

    assert_eq!(report.outcome, Some(RunOutcome::Completed));
    assert_eq!(report.committed.len(), 1);
    let committed = &report.committed[0];
    assert_eq!(committed.identifier, "abc123");
    assert_eq!(committed.token_count, 2);
    assert_eq!(committed.media_path, ws.output_dir.join("abc123.mp4"));
    assert_eq!(committed.audio_path, ws.output_dir.join("abc123.mp3"));

    let ledger = store.load().unwrap();
    let item = &ledger.items()[0];
    assert_eq!(item.acquisition_status, AcquisitionStatus::Acquired);
    assert_eq!(item.transcription_status, TranscriptionStatus::Transcribed);
    assert_eq!(item.sidecar_status, SidecarStatus::Written);
    assert_eq!(item.transcript_text, "hi there");
}

#[tokio::test]
async fn test_resumable_across_runs() {
    let ws = Workspace::with_pending(&["a", "b"]);
    let store = ws.store();
    let calls = Arc::new(Mutex::new(Vec::new()));

    for _ in 0..3 {
        let acquirer = FakeAcquirer {
            calls: calls.clone(),
            ..Default::default()
        };
        let orchestrator = ws.orchestrator(
            acquirer,
            FakeExtractor::default(),
            FakeTranscriber::saying(&["word"]),
            RunLimits::default(),
        );
        orchestrator.run(&store).await.unwrap();
    }

    // Third run found nothing; no item was processed twice
    assert_eq!(*calls.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
    assert!(store.load().unwrap().items().iter().all(|i| i.is_complete()));
}

#[tokio::test]
async fn test_nothing_to_do_leaves_ledger_untouched() {
    let ws = Workspace::with_csv(&format!(
        "{}\nabc,https://example.com/abc,downloaded,transcribed,hello,yes\n",
        common::HEADER
    ));
    let before = ws.ledger_bytes();

    let report = ws.happy_orchestrator().run(&ws.store()).await.unwrap();

    assert!(report.is_nothing_to_do());
    assert!(report.committed.is_empty());
    assert_eq!(ws.ledger_bytes(), before);
    assert!(!ws.output_dir.exists());
}

#[tokio::test]
async fn test_at_most_one_commit_by_default() {
    let ws = Workspace::with_pending(&["a", "b", "c"]);
    let store = ws.store();

    let report = ws.happy_orchestrator().run(&store).await.unwrap();
    assert_eq!(report.committed.len(), 1);

    let ledger = store.load().unwrap();
    let done: Vec<_> = ledger
        .items()
        .iter()
        .filter(|i| !i.is_eligible())
        .map(|i| i.identifier.as_str())
        .collect();
    assert_eq!(done, ["a"]);
}

#[tokio::test]
async fn test_max_items_per_run() {
    let ws = Workspace::with_pending(&["a", "b", "c"]);
    let store = ws.store();
    let orchestrator = ws.orchestrator(
        FakeAcquirer::default(),
        FakeExtractor::default(),
        FakeTranscriber::saying(&["x"]),
        RunLimits {
            max_items_per_run: 2,
            ..Default::default()
        },
    );

    let report = orchestrator.run(&store).await.unwrap();

    assert_eq!(report.committed.len(), 2);
    let pending: Vec<_> = store
        .load()
        .unwrap()
        .items()
        .iter()
        .filter(|i| i.is_eligible())
        .map(|i| i.identifier.clone())
        .collect();
    assert_eq!(pending, ["c"]);
}

#[tokio::test]
async fn test_acquisition_failure_skips_and_continues() {
    let ws = Workspace::with_pending(&["A", "B"]);
    let store = ws.store();
    let orchestrator = ws.orchestrator(
        FakeAcquirer::failing(&["A"]),
        FakeExtractor::default(),
        FakeTranscriber::saying(&["hello"]),
        RunLimits::default(),
    );

    let report = orchestrator.run(&store).await.unwrap();

    assert_eq!(report.outcome, Some(RunOutcome::Completed));
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].identifier, "A");
    assert_eq!(report.skipped[0].stage, Stage::Acquiring);
    assert_eq!(report.committed[0].identifier, "B");

    let ledger = store.load().unwrap();
    assert!(ledger.items()[0].is_eligible());
    assert!(ledger.items()[1].is_complete());
    assert_eq!(ledger.items()[1].transcript_text, "hello");
}

#[tokio::test]
async fn test_all_acquisitions_fail_is_exhausted() {
    let ws = Workspace::with_pending(&["A", "B"]);
    let before = ws.ledger_bytes();
    let orchestrator = ws.orchestrator(
        FakeAcquirer::failing(&["A", "B"]),
        FakeExtractor::default(),
        FakeTranscriber::default(),
        RunLimits::default(),
    );

    let report = orchestrator.run(&ws.store()).await.unwrap();

    assert_eq!(report.outcome, Some(RunOutcome::Exhausted));
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(ws.ledger_bytes(), before);
}

#[tokio::test]
async fn test_extraction_failure_is_fatal_by_default() {
    let ws = Workspace::with_pending(&["A", "B"]);
    let before = ws.ledger_bytes();
    let transcriber = FakeTranscriber::default();
    let transcribed = transcriber.calls.clone();
    let orchestrator = ws.orchestrator(
        FakeAcquirer::default(),
        FakeExtractor::failing(&["A"]),
        transcriber,
        RunLimits::default(),
    );

    let err = orchestrator.run(&ws.store()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Extraction { ref id, .. } if id == "A"));
    assert_eq!(ws.ledger_bytes(), before);
    assert!(transcribed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_extraction_failure_skipped_under_skip_policy() {
    let ws = Workspace::with_pending(&["A", "B"]);
    let store = ws.store();
    let orchestrator = ws.orchestrator(
        FakeAcquirer::default(),
        FakeExtractor::failing(&["A"]),
        FakeTranscriber::saying(&["ok"]),
        skip_policy(),
    );

    let report = orchestrator.run(&store).await.unwrap();

    assert_eq!(report.skipped[0].stage, Stage::Extracting);
    assert_eq!(report.committed[0].identifier, "B");
    assert!(store.load().unwrap().items()[0].is_eligible());
}

#[tokio::test]
async fn test_transcription_failure_is_fatal_by_default() {
    let ws = Workspace::with_pending(&["A"]);
    let before = ws.ledger_bytes();
    let orchestrator = ws.orchestrator(
        FakeAcquirer::default(),
        FakeExtractor::default(),
        FakeTranscriber {
            fail: true,
            ..Default::default()
        },
        RunLimits::default(),
    );

    let err = orchestrator.run(&ws.store()).await.unwrap_err();

    assert_eq!(err.stage(), Stage::Transcribing);
    assert_eq!(ws.ledger_bytes(), before);
    assert!(!SidecarWriter::new(&ws.output_dir).path_for("A").exists());
}

#[tokio::test]
async fn test_sidecar_failure_leaves_ledger_byte_identical() {
    let ws = Workspace::with_pending(&["abc"]);
    let before = ws.ledger_bytes();

    // A directory where the sidecar should go makes the write fail
    std::fs::create_dir_all(ws.output_dir.join("abc.json")).unwrap();

    let err = ws.happy_orchestrator().run(&ws.store()).await.unwrap_err();

    assert!(matches!(err, PipelineError::SidecarWrite { .. }));
    assert_eq!(ws.ledger_bytes(), before);
}

#[tokio::test]
async fn test_sidecar_failure_skipped_under_skip_policy() {
    let ws = Workspace::with_pending(&["abc", "def"]);
    let store = ws.store();
    std::fs::create_dir_all(ws.output_dir.join("abc.json")).unwrap();

    let orchestrator = ws.orchestrator(
        FakeAcquirer::default(),
        FakeExtractor::default(),
        FakeTranscriber::saying(&["x"]),
        skip_policy(),
    );
    let report = orchestrator.run(&store).await.unwrap();

    assert_eq!(report.skipped[0].stage, Stage::WritingSidecar);
    assert_eq!(report.committed[0].identifier, "def");
}

#[tokio::test]
async fn test_empty_transcription_succeeds() {
    let ws = Workspace::with_pending(&["silent"]);
    let store = ws.store();
    let orchestrator = ws.orchestrator(
        FakeAcquirer::default(),
        FakeExtractor::default(),
        FakeTranscriber::default(),
        RunLimits::default(),
    );

    let report = orchestrator.run(&store).await.unwrap();

    assert_eq!(report.committed[0].token_count, 0);
    let ledger = store.load().unwrap();
    let item = &ledger.items()[0];
    assert!(item.is_complete());
    assert_eq!(item.transcript_text, "");

    let sidecar = std::fs::read_to_string(ws.output_dir.join("silent.json")).unwrap();
    assert_eq!(sidecar.trim(), "[]");
}

#[tokio::test]
async fn test_sidecar_named_by_identifier() {
    let ws = Workspace::with_csv(&format!(
        "{}\nabc123,https://other.example/some/long/path?x=1,,,,\n",
        common::HEADER
    ));

    let report = ws.happy_orchestrator().run(&ws.store()).await.unwrap();

    assert_eq!(report.committed[0].sidecar_path, ws.output_dir.join("abc123.json"));
    let tokens = SidecarWriter::new(&ws.output_dir).read("abc123").unwrap();
    let words: Vec<_> = tokens.iter().map(|t| t.word.as_str()).collect();
    assert_eq!(words, ["hi", "there"]);
}

#[tokio::test]
async fn test_stage_timeout_is_a_stage_failure() {
    let ws = Workspace::with_pending(&["slow"]);
    let before = ws.ledger_bytes();
    let orchestrator = ws.orchestrator(
        FakeAcquirer::default(),
        FakeExtractor::default(),
        FakeTranscriber {
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        },
        RunLimits {
            timeouts: StageTimeouts {
                transcribe_seconds: 1,
                ..Default::default()
            },
            ..Default::default()
        },
    );

    let err = orchestrator.run(&ws.store()).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Transcription {
            source: AdapterError::Timeout { .. },
            ..
        }
    ));
    assert_eq!(ws.ledger_bytes(), before);
}

#[tokio::test]
async fn test_ledger_changed_during_run_is_not_overwritten() {
    let ws = Workspace::with_pending(&["a"]);
    let store = ws.store();

    // Edit the ledger while the transcriber is running
    let path = ws.ledger_path.clone();
    let editor = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut csv = std::fs::read_to_string(&path).unwrap();
        csv.push_str("b,https://example.com/b,,,,\n");
        std::fs::write(&path, csv).unwrap();
    });

    let orchestrator = ws.orchestrator(
        FakeAcquirer::default(),
        FakeExtractor::default(),
        FakeTranscriber {
            delay: Some(Duration::from_millis(300)),
            ..FakeTranscriber::saying(&["x"])
        },
        RunLimits::default(),
    );
    let result = orchestrator.run(&store).await;
    editor.await.unwrap();

    assert!(matches!(
        result,
        Err(PipelineError::Ledger(
            ledgerscribe::core::LedgerError::ConcurrentModification { .. }
        ))
    ));
    // The external edit survives
    assert_eq!(store.load().unwrap().len(), 2);
}

#[tokio::test]
async fn test_spreadsheet_column_layout() {
    use ledgerscribe::core::{ColumnNames, CsvLedger};

    let ws = Workspace::with_csv(
        "Video ID,Video URL,Video Status,Transcription Status,Transcribed Text,Json,Notes\n\
         v1,https://example.com/v1,downloaded,transcribed,old text,yes,keep me\n\
         v2,https://example.com/v2,,,,,second\n",
    );
    let columns = ColumnNames {
        identifier: "Video ID".to_string(),
        locator: "Video URL".to_string(),
        acquisition_status: "Video Status".to_string(),
        transcription_status: "Transcription Status".to_string(),
        transcript_text: "Transcribed Text".to_string(),
        sidecar_status: "Json".to_string(),
    };
    let store = CsvLedger::new(&ws.ledger_path, columns);

    let report = ws.happy_orchestrator().run(&store).await.unwrap();
    assert_eq!(report.committed[0].identifier, "v2");

    let csv = std::fs::read_to_string(&ws.ledger_path).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next().unwrap(),
        "Video ID,Video URL,Video Status,Transcription Status,Transcribed Text,Json,Notes"
    );
    assert!(lines.next().unwrap().ends_with(",keep me"));
    let v2 = lines.next().unwrap();
    assert!(v2.contains("hi there"));
    assert!(v2.ends_with(",second"));
}
