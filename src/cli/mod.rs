//! Command-line interface for ledgerscribe.
//!
//! Provides commands for running the pipeline, inspecting the ledger and
//! the run journal, and checking that the external tools are available.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::adapters::{
    Acquirer, AudioExtractor, ComputeDevice, ComputePrecision, FfmpegExtractor, Transcriber,
    WhisperTranscriber, YtDlpAcquirer,
};
use crate::config::{load_config, ResolvedConfig};
use crate::core::{
    select_next, CsvLedger, FailurePolicy, LedgerStore, Orchestrator, RunJournal, SidecarWriter,
};
use crate::domain::{JournalEvent, RunOutcome, RunReport, SidecarStatus, WorkItem};

/// ledgerscribe - Ledger-driven media transcription pipeline
#[derive(Parser, Debug)]
#[command(name = "ledgerscribe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: discover .ledgerscribe/config.yaml)
    #[arg(long, global = true, env = "LEDGERSCRIBE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Ledger CSV file
    #[arg(long, global = true)]
    pub ledger: Option<PathBuf>,

    /// Directory for media, audio and sidecar artifacts
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process the next eligible ledger item(s)
    Run {
        /// Items to commit before stopping
        #[arg(long)]
        max_items: Option<usize>,

        /// What extraction, transcription and sidecar failures do to the run
        #[arg(long, value_enum)]
        failure_policy: Option<FailurePolicy>,

        /// Whisper model size or path
        #[arg(long)]
        model: Option<String>,

        /// Model weight precision
        #[arg(long, value_enum)]
        precision: Option<ComputePrecision>,

        /// Inference device
        #[arg(long, value_enum)]
        device: Option<ComputeDevice>,

        /// Show the item that would be processed without touching anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Show ledger progress
    Status {
        /// Check every written sidecar exists and parses
        #[arg(long)]
        verify: bool,
    },

    /// List ledger items
    List {
        /// Only show items in this state
        #[arg(short, long, value_enum)]
        status: Option<ItemFilter>,

        /// Maximum number of items to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show recent journal events
    History {
        /// Maximum number of events to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// One line per finished run, newest first
        #[arg(long)]
        runs: bool,
    },

    /// Show resolved configuration
    Config,

    /// Check the external tools are installed
    Doctor,
}

/// Item filter for `list`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ItemFilter {
    /// Not yet acquired
    Pending,
    /// Acquired
    Done,
}

impl ItemFilter {
    fn matches(&self, item: &WorkItem) -> bool {
        match self {
            ItemFilter::Pending => item.is_eligible(),
            ItemFilter::Done => !item.is_eligible(),
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = self.resolve_config()?;

        match self.command {
            Commands::Run {
                max_items,
                failure_policy,
                model,
                precision,
                device,
                dry_run,
            } => {
                let mut config = config;
                if let Some(n) = max_items {
                    config.run.max_items_per_run = n;
                }
                if let Some(policy) = failure_policy {
                    config.run.failure_policy = policy;
                }
                if let Some(model) = model {
                    config.transcription.model = model;
                }
                if let Some(precision) = precision {
                    config.transcription.precision = precision;
                }
                if let Some(device) = device {
                    config.transcription.device = device;
                }
                run(&config, dry_run).await
            }
            Commands::Status { verify } => show_status(&config, verify),
            Commands::List { status, limit } => list_items(&config, status, limit),
            Commands::History { limit, runs } => show_history(&config, limit, runs).await,
            Commands::Config => show_config(&config),
            Commands::Doctor => doctor(&config).await,
        }
    }

    fn resolve_config(&self) -> Result<ResolvedConfig> {
        let mut config = load_config(self.config.as_deref())?;
        if let Some(ledger) = &self.ledger {
            config.ledger = ledger.clone();
        }
        if let Some(output_dir) = &self.output_dir {
            config.output_dir = output_dir.clone();
        }
        Ok(config)
    }
}

fn open_ledger(config: &ResolvedConfig) -> CsvLedger {
    CsvLedger::new(&config.ledger, config.columns.clone())
}

/// Wire the production adapters from configuration
pub fn build_orchestrator(config: &ResolvedConfig) -> Orchestrator {
    Orchestrator::new(
        Box::new(YtDlpAcquirer::new(config.acquisition.clone())),
        Box::new(FfmpegExtractor::new(config.extraction.clone())),
        Box::new(WhisperTranscriber::new(config.transcription.clone())),
        &config.output_dir,
        config.run.clone(),
    )
    .with_journal(RunJournal::in_home(&config.home))
}

async fn run(config: &ResolvedConfig, dry_run: bool) -> Result<()> {
    let store = open_ledger(config);

    if dry_run {
        match select_next(&store)? {
            Some(item) => {
                println!("Next item: {}", item.identifier);
                println!("  Locator: {}", item.locator);
                println!(
                    "  Sidecar: {}",
                    SidecarWriter::new(&config.output_dir).path_for(&item.identifier).display()
                );
            }
            None => println!("Nothing to do: all items have been acquired."),
        }
        return Ok(());
    }

    let _lock = store.lock()?;
    let orchestrator = build_orchestrator(config);
    let report = orchestrator
        .run(&store)
        .await
        .with_context(|| format!("Run against {} aborted", store.location()))?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    for skipped in &report.skipped {
        println!(
            "Skipped {} at {}: {}",
            skipped.identifier, skipped.stage, skipped.error
        );
    }

    for item in &report.committed {
        println!("Processed {}", item.identifier);
        println!("  Media:   {}", item.media_path.display());
        println!("  Audio:   {}", item.audio_path.display());
        println!("  Sidecar: {} ({} words)", item.sidecar_path.display(), item.token_count);
    }

    match report.outcome {
        Some(RunOutcome::NothingToDo) => println!("Nothing to do: all items have been acquired."),
        Some(RunOutcome::Exhausted) => {
            println!("No item could be processed this run; skipped items remain pending.")
        }
        Some(RunOutcome::Completed) | None => {}
    }
}

fn show_status(config: &ResolvedConfig, verify: bool) -> Result<()> {
    let ledger = open_ledger(config).load()?;
    let counts = ledger.counts();

    println!("Ledger: {}", config.ledger.display());
    println!("  Items:       {}", counts.total);
    println!("  Pending:     {}", counts.pending);
    println!("  Acquired:    {}", counts.acquired);
    println!("  Transcribed: {}", counts.transcribed);
    println!("  Sidecars:    {}", counts.written);
    println!("  Complete:    {}", counts.complete);

    if !verify {
        return Ok(());
    }

    let sidecars = SidecarWriter::new(&config.output_dir);
    let mut problems = 0usize;
    for item in ledger
        .items()
        .iter()
        .filter(|i| i.sidecar_status == SidecarStatus::Written)
    {
        if let Err(e) = sidecars.verify(&item.identifier) {
            problems += 1;
            println!("  ✗ {}: {}", item.identifier, e);
        }
    }

    if problems > 0 {
        anyhow::bail!("{} sidecar artifact(s) failed verification", problems);
    }
    println!("All {} sidecar artifact(s) verified", counts.written);
    Ok(())
}

fn list_items(config: &ResolvedConfig, filter: Option<ItemFilter>, limit: usize) -> Result<()> {
    let ledger = open_ledger(config).load()?;

    let items: Vec<&WorkItem> = ledger
        .items()
        .iter()
        .filter(|item| filter.map(|f| f.matches(item)).unwrap_or(true))
        .take(limit)
        .collect();

    if items.is_empty() {
        println!("No items found");
        return Ok(());
    }

    println!(
        "{:<20} {:<10} {:<12} {:<8} {:<40}",
        "ID", "MEDIA", "TRANSCRIPT", "SIDECAR", "LOCATOR"
    );
    println!("{}", "-".repeat(94));

    for item in items {
        println!(
            "{:<20} {:<10} {:<12} {:<8} {:<40}",
            truncate(&item.identifier, 20),
            item.acquisition_status.as_str(),
            item.transcription_status.as_str(),
            item.sidecar_status.as_str(),
            truncate(&item.locator, 40)
        );
    }

    Ok(())
}

async fn show_history(config: &ResolvedConfig, limit: usize, runs: bool) -> Result<()> {
    let journal = RunJournal::in_home(&config.home);
    let events = if runs {
        journal.recent_runs(limit).await?
    } else {
        let events = journal.replay().await?;
        let start = events.len().saturating_sub(limit);
        events.into_iter().skip(start).collect()
    };

    if events.is_empty() {
        println!("No runs recorded in {}", journal.path().display());
        return Ok(());
    }

    for event in &events {
        println!("{}", format_event(event));
    }

    Ok(())
}

fn format_event(event: &JournalEvent) -> String {
    let run = event.run_id.to_string();
    let mut line = format!(
        "{} {} {:<16} {}",
        event.timestamp.format("%Y-%m-%d %H:%M:%S"),
        &run[..8],
        event.event_type.as_str(),
        event.summary
    );
    if let Some(ms) = event.duration_ms {
        line.push_str(&format!(" ({}ms)", ms));
    }
    if let Some(error) = &event.error {
        line.push_str(&format!(" - {}", error));
    }
    line
}

fn show_config(config: &ResolvedConfig) -> Result<()> {
    match &config.config_file {
        Some(path) => println!("# Config file: {}", path.display()),
        None => println!("# Config file: (none, using defaults)"),
    }
    print!("{}", config.to_yaml()?);
    Ok(())
}

async fn doctor(config: &ResolvedConfig) -> Result<()> {
    let acquirer = YtDlpAcquirer::new(config.acquisition.clone());
    let extractor = FfmpegExtractor::new(config.extraction.clone());
    let transcriber = WhisperTranscriber::new(config.transcription.clone());

    let checks = [
        (acquirer.name().to_string(), acquirer.health_check().await),
        (extractor.name().to_string(), extractor.health_check().await),
        (transcriber.name().to_string(), transcriber.health_check().await),
    ];

    let mut failures = 0usize;
    for (name, result) in &checks {
        match result {
            Ok(()) => println!("  ✓ {}", name),
            Err(e) => {
                failures += 1;
                println!("  ✗ {}: {}", name, e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} tools unavailable", failures, checks.len());
    }
    println!("All tools available");
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JournalEventType;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "ledgerscribe",
            "--ledger",
            "videos.csv",
            "run",
            "--max-items",
            "3",
            "--failure-policy",
            "skip",
            "--precision",
            "int8-float16",
            "--device",
            "cuda",
        ])
        .unwrap();

        assert_eq!(cli.ledger, Some(PathBuf::from("videos.csv")));
        match cli.command {
            Commands::Run {
                max_items,
                failure_policy,
                precision,
                device,
                dry_run,
                ..
            } => {
                assert_eq!(max_items, Some(3));
                assert_eq!(failure_policy, Some(FailurePolicy::Skip));
                assert_eq!(precision, Some(ComputePrecision::Int8Float16));
                assert_eq!(device, Some(ComputeDevice::Cuda));
                assert!(!dry_run);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["ledgerscribe", "status", "--verify", "--output-dir", "out"])
            .unwrap();
        assert_eq!(cli.output_dir, Some(PathBuf::from("out")));
        assert!(matches!(cli.command, Commands::Status { verify: true }));
    }

    #[test]
    fn test_list_filter() {
        let cli = Cli::try_parse_from(["ledgerscribe", "list", "--status", "pending", "-l", "5"])
            .unwrap();
        match cli.command {
            Commands::List { status, limit } => {
                assert_eq!(status, Some(ItemFilter::Pending));
                assert_eq!(limit, 5);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let mut item = WorkItem::new("a", "https://example.com/a");
        assert!(ItemFilter::Pending.matches(&item));
        item.mark_completed("text".to_string());
        assert!(ItemFilter::Done.matches(&item));
    }

    #[test]
    fn test_history_runs_view() {
        let cli = Cli::try_parse_from(["ledgerscribe", "history", "--runs", "-l", "3"]).unwrap();
        assert!(matches!(cli.command, Commands::History { limit: 3, runs: true }));

        let cli = Cli::try_parse_from(["ledgerscribe", "history"]).unwrap();
        assert!(matches!(cli.command, Commands::History { limit: 20, runs: false }));
    }

    #[test]
    fn test_format_event_line() {
        let run_id = uuid::Uuid::new_v4();
        let event = JournalEvent::run(run_id, JournalEventType::RunFailed, "Run failed".to_string())
            .with_duration(42)
            .with_error("ledger locked".to_string());

        let line = format_event(&event);
        assert!(line.contains(&run_id.to_string()[..8]));
        assert!(line.contains("run_failed"));
        assert!(line.ends_with("Run failed (42ms) - ledger locked"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-identifier", 10), "a-very-...");
    }
}
