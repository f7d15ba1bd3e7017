//! CSV-backed progress ledger.
//!
//! The ledger is loaded in full at run start and overwritten in full on
//! commit. Saves go through a temp file in the same directory followed by a
//! rename, so a failed write never leaves a truncated ledger behind.
//!
//! Two guards exist for the single-writer assumption:
//! - an advisory lock on `<ledger>.lock`, held for the duration of a run
//! - a SHA-256 fingerprint taken at load; `save` refuses to overwrite a file
//!   whose bytes changed in the meantime

use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::domain::{AcquisitionStatus, SidecarStatus, TranscriptionStatus, WorkItem};

/// Errors raised by ledger storage
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to read ledger {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write ledger {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed ledger {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Ledger {path} is missing required column '{column}'")]
    MissingColumn { path: PathBuf, column: String },

    #[error("Ledger row {row}: identifier is empty")]
    EmptyIdentifier { row: u64 },

    #[error("Ledger row {row}: identifier '{identifier}' cannot be used as a file name")]
    InvalidIdentifier { row: u64, identifier: String },

    #[error("Ledger row {row}: duplicate identifier '{identifier}'")]
    DuplicateIdentifier { row: u64, identifier: String },

    #[error("Ledger {path} changed on disk since it was loaded; refusing to overwrite")]
    ConcurrentModification { path: PathBuf },

    #[error("Ledger {path} is locked by another run")]
    Locked { path: PathBuf },

    #[error("Failed to lock ledger {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No ledger item at index {index}")]
    IndexOutOfRange { index: usize },
}

/// Header names of the columns the pipeline reads and writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub identifier: String,
    pub locator: String,
    pub acquisition_status: String,
    pub transcription_status: String,
    pub transcript_text: String,
    pub sidecar_status: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            identifier: "identifier".to_string(),
            locator: "locator".to_string(),
            acquisition_status: "acquisition_status".to_string(),
            transcription_status: "transcription_status".to_string(),
            transcript_text: "transcript_text".to_string(),
            sidecar_status: "sidecar_status".to_string(),
        }
    }
}

/// In-memory copy of the ledger
#[derive(Debug, Clone)]
pub struct Ledger {
    /// Header row, in file order
    headers: Vec<String>,

    layout: ColumnLayout,

    items: Vec<WorkItem>,

    /// SHA-256 of the durable bytes this copy was loaded from (or last saved as)
    fingerprint: Option<String>,
}

/// Positions of the pipeline columns within one loaded ledger
#[derive(Debug, Clone, Copy)]
struct ColumnLayout {
    identifier: usize,
    locator: usize,
    acquisition_status: usize,
    transcription_status: usize,
    transcript_text: usize,
    sidecar_status: usize,
    /// Header count of the file as read; cells past it are carried verbatim
    source_width: usize,
}

impl ColumnLayout {
    /// Value written at column `col` for `item`
    fn cell<'a>(&self, item: &'a WorkItem, col: usize) -> &'a str {
        let raw = item.cells.get(col).map(String::as_str);
        if col == self.acquisition_status {
            item.acquisition_status.as_str()
        } else if col == self.transcription_status {
            item.transcription_status.as_str()
        } else if col == self.transcript_text {
            &item.transcript_text
        } else if col == self.sidecar_status {
            item.sidecar_status.as_str()
        } else if col == self.identifier {
            raw.unwrap_or(&item.identifier)
        } else if col == self.locator {
            raw.unwrap_or(&item.locator)
        } else if col < self.source_width {
            raw.unwrap_or("")
        } else {
            ""
        }
    }

    /// Cells beyond the file's header row
    fn overflow<'a>(&self, item: &'a WorkItem) -> &'a [String] {
        item.cells.get(self.source_width..).unwrap_or(&[])
    }
}

impl Ledger {
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    /// Index of the first item whose acquisition is still pending
    pub fn find_first_eligible(&self) -> Option<usize> {
        find_first_eligible(&self.items)
    }

    /// Like [`Ledger::find_first_eligible`], treating `skipped` indices as ineligible
    pub fn find_first_eligible_excluding(&self, skipped: &HashSet<usize>) -> Option<usize> {
        self.items
            .iter()
            .enumerate()
            .find(|(idx, item)| item.is_eligible() && !skipped.contains(idx))
            .map(|(idx, _)| idx)
    }

    /// Mark the item at `index` as fully processed (in memory only)
    pub fn commit(
        &mut self,
        index: usize,
        transcript_text: String,
    ) -> Result<&WorkItem, LedgerError> {
        let item = self
            .items
            .get_mut(index)
            .ok_or(LedgerError::IndexOutOfRange { index })?;
        item.mark_completed(transcript_text);
        Ok(item)
    }

    /// Status counts across all items
    pub fn counts(&self) -> LedgerCounts {
        let mut counts = LedgerCounts {
            total: self.items.len(),
            ..Default::default()
        };
        for item in &self.items {
            match item.acquisition_status {
                AcquisitionStatus::Pending => counts.pending += 1,
                AcquisitionStatus::Acquired => counts.acquired += 1,
            }
            if item.transcription_status == TranscriptionStatus::Transcribed {
                counts.transcribed += 1;
            }
            if item.sidecar_status == SidecarStatus::Written {
                counts.written += 1;
            }
            if item.is_complete() {
                counts.complete += 1;
            }
        }
        counts
    }
}

/// Index of the first eligible item in ledger order
pub fn find_first_eligible(items: &[WorkItem]) -> Option<usize> {
    items.iter().position(WorkItem::is_eligible)
}

/// Status summary of a ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCounts {
    pub total: usize,
    pub pending: usize,
    pub acquired: usize,
    pub transcribed: usize,
    pub written: usize,
    pub complete: usize,
}

/// Durable storage for the ledger.
///
/// This is the seam the orchestrator depends on; it never touches the file
/// format directly.
pub trait LedgerStore: Send + Sync {
    /// Where the ledger lives, for messages
    fn location(&self) -> String;

    /// Read the full ledger
    fn load(&self) -> Result<Ledger, LedgerError>;

    /// Atomically replace the durable ledger with `ledger`
    fn save(&self, ledger: &mut Ledger) -> Result<(), LedgerError>;
}

/// Ledger stored as a CSV file with a header row
#[derive(Debug, Clone)]
pub struct CsvLedger {
    path: PathBuf,
    columns: ColumnNames,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>, columns: ColumnNames) -> Self {
        Self {
            path: path.into(),
            columns,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> &ColumnNames {
        &self.columns
    }

    /// Path of the advisory lock file next to the ledger
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Take the exclusive run lock; fails fast if another run holds it
    pub fn lock(&self) -> Result<LedgerLock, LedgerError> {
        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|source| LedgerError::Lock {
                path: lock_path.clone(),
                source,
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(LedgerLock {
                _file: file,
                path: lock_path,
            }),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                Err(LedgerError::Locked { path: self.path.clone() })
            }
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                Err(LedgerError::Locked { path: self.path.clone() })
            }
            Err(source) => Err(LedgerError::Lock {
                path: lock_path,
                source,
            }),
        }
    }

    fn read_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        fs::read(&self.path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                LedgerError::NotFound {
                    path: self.path.clone(),
                }
            } else {
                LedgerError::Read {
                    path: self.path.clone(),
                    source,
                }
            }
        })
    }

    /// Parse CSV bytes into a ledger with no fingerprint yet
    fn parse(&self, bytes: &[u8]) -> Result<Ledger, LedgerError> {
        let parse_err = |source| LedgerError::Parse {
            path: self.path.clone(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(bytes);

        let mut headers: Vec<String> = reader
            .headers()
            .map_err(parse_err)?
            .iter()
            .map(str::to_string)
            .collect();
        let source_width = headers.len();

        let position = |headers: &[String], name: &str| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
        };
        let require = |name: &str| {
            position(&headers, name).ok_or_else(|| LedgerError::MissingColumn {
                path: self.path.clone(),
                column: name.to_string(),
            })
        };
        let identifier = require(&self.columns.identifier)?;
        let locator = require(&self.columns.locator)?;

        // Status columns the file lacks are appended on the next save
        let mut status_column = |name: &str| {
            position(&headers, name).unwrap_or_else(|| {
                headers.push(name.to_string());
                headers.len() - 1
            })
        };
        let acquisition_status = status_column(&self.columns.acquisition_status);
        let transcription_status = status_column(&self.columns.transcription_status);
        let transcript_text = status_column(&self.columns.transcript_text);
        let sidecar_status = status_column(&self.columns.sidecar_status);
        let layout = ColumnLayout {
            identifier,
            locator,
            acquisition_status,
            transcription_status,
            transcript_text,
            sidecar_status,
            source_width,
        };

        let mut items = Vec::new();
        let mut seen: HashMap<String, u64> = HashMap::new();

        for (idx, record) in reader.records().enumerate() {
            let record = record.map_err(parse_err)?;
            let row = record
                .position()
                .map(|p| p.line())
                .unwrap_or(idx as u64 + 2);
            // Appended status columns have no cell in the source file
            let cell = |col: usize| {
                if col < source_width {
                    record.get(col).unwrap_or("")
                } else {
                    ""
                }
            };

            let id = cell(layout.identifier).trim().to_string();
            validate_identifier(&id, row)?;
            if seen.insert(id.clone(), row).is_some() {
                return Err(LedgerError::DuplicateIdentifier { row, identifier: id });
            }

            items.push(WorkItem {
                identifier: id,
                locator: cell(layout.locator).trim().to_string(),
                acquisition_status: AcquisitionStatus::parse(cell(layout.acquisition_status)),
                transcription_status: TranscriptionStatus::parse(cell(layout.transcription_status)),
                transcript_text: cell(layout.transcript_text).to_string(),
                sidecar_status: SidecarStatus::parse(cell(layout.sidecar_status)),
                cells: record.iter().map(str::to_string).collect(),
            });
        }

        Ok(Ledger {
            headers,
            layout,
            items,
            fingerprint: None,
        })
    }

    /// Render the ledger as CSV bytes, preserving column order
    fn render(&self, ledger: &Ledger) -> Result<Vec<u8>, LedgerError> {
        let write_err = |source: csv::Error| LedgerError::Write {
            path: self.path.clone(),
            source: source.into(),
        };

        // Rows wider than the header row are written back as they were read
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());
        writer.write_record(&ledger.headers).map_err(write_err)?;

        let layout = &ledger.layout;
        for item in &ledger.items {
            let row: Vec<&str> = (0..ledger.headers.len())
                .map(|col| layout.cell(item, col))
                .chain(layout.overflow(item).iter().map(String::as_str))
                .collect();
            writer.write_record(&row).map_err(write_err)?;
        }

        writer.into_inner().map_err(|e| LedgerError::Write {
            path: self.path.clone(),
            source: e.into_error(),
        })
    }
}

impl LedgerStore for CsvLedger {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<Ledger, LedgerError> {
        let bytes = self.read_bytes()?;
        let mut ledger = self.parse(&bytes)?;
        ledger.fingerprint = Some(fingerprint(&bytes));
        debug!(path = %self.path.display(), items = ledger.len(), "Ledger parsed");

        Ok(ledger)
    }

    fn save(&self, ledger: &mut Ledger) -> Result<(), LedgerError> {
        let bytes = self.render(ledger)?;

        if let Some(expected) = ledger.fingerprint.as_deref() {
            let current = match fs::read(&self.path) {
                Ok(existing) => Some(fingerprint(&existing)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => None,
                Err(source) => {
                    return Err(LedgerError::Read {
                        path: self.path.clone(),
                        source,
                    })
                }
            };
            if current.as_deref() != Some(expected) {
                return Err(LedgerError::ConcurrentModification {
                    path: self.path.clone(),
                });
            }
        }

        write_atomically(&self.path, &bytes).map_err(|source| LedgerError::Write {
            path: self.path.clone(),
            source,
        })?;
        ledger.fingerprint = Some(fingerprint(&bytes));

        debug!(path = %self.path.display(), bytes = bytes.len(), "Ledger saved");
        Ok(())
    }
}

/// Exclusive advisory lock on a ledger; released on drop
#[derive(Debug)]
pub struct LedgerLock {
    _file: File,
    path: PathBuf,
}

impl LedgerLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Identifiers double as artifact file stems
pub fn validate_identifier(identifier: &str, row: u64) -> Result<(), LedgerError> {
    if identifier.is_empty() {
        return Err(LedgerError::EmptyIdentifier { row });
    }
    let unusable = identifier == "."
        || identifier == ".."
        || identifier.contains(['/', '\\', '\0']);
    if unusable {
        return Err(LedgerError::InvalidIdentifier {
            row,
            identifier: identifier.to_string(),
        });
    }
    Ok(())
}

/// Full SHA-256 of ledger bytes, hex encoded
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Replace `path` with `bytes` through a sibling temp file and a rename.
///
/// On error the previous file is untouched and the temp file is removed.
fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = NamedTempFile::new_in(parent_dir(path))?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    // Keep the original file mode rather than the temp file's 0600
    if let Ok(meta) = fs::metadata(path) {
        tmp.as_file().set_permissions(meta.permissions())?;
    }

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}
