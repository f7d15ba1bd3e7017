//! Work items and their per-stage status fields.
//!
//! A WorkItem is one row of the ledger. Status fields only ever move
//! forward: the only mutation offered is [`WorkItem::mark_completed`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// One row of the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique, stable identifier (also the artifact file stem)
    pub identifier: String,

    /// Opaque source reference handed to the acquisition adapter
    pub locator: String,

    pub acquisition_status: AcquisitionStatus,

    pub transcription_status: TranscriptionStatus,

    /// Joined transcript, empty until transcribed
    pub transcript_text: String,

    pub sidecar_status: SidecarStatus,

    /// Raw cells as read from the ledger, by column position.
    ///
    /// Columns the pipeline does not own, and cells past the end of the
    /// header row, are written back from here unchanged.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cells: Vec<String>,
}

impl WorkItem {
    /// Create a fresh, fully pending item
    pub fn new(identifier: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            locator: locator.into(),
            acquisition_status: AcquisitionStatus::Pending,
            transcription_status: TranscriptionStatus::Pending,
            transcript_text: String::new(),
            sidecar_status: SidecarStatus::Pending,
            cells: Vec::new(),
        }
    }

    /// An item is eligible while its media has not been acquired
    pub fn is_eligible(&self) -> bool {
        self.acquisition_status == AcquisitionStatus::Pending
    }

    /// Whether every stage of the pipeline has been recorded as done
    pub fn is_complete(&self) -> bool {
        self.acquisition_status == AcquisitionStatus::Acquired
            && self.transcription_status == TranscriptionStatus::Transcribed
            && self.sidecar_status == SidecarStatus::Written
    }

    /// Record a fully processed item.
    ///
    /// Only called after the sidecar artifact has been durably written.
    pub fn mark_completed(&mut self, transcript_text: String) {
        self.acquisition_status = AcquisitionStatus::Acquired;
        self.transcription_status = TranscriptionStatus::Transcribed;
        self.transcript_text = transcript_text;
        self.sidecar_status = SidecarStatus::Written;
    }
}

/// Media acquisition state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionStatus {
    #[default]
    Pending,
    Acquired,
}

impl AcquisitionStatus {
    /// Parse a ledger cell; anything not recognised as done is pending
    pub fn parse(cell: &str) -> Self {
        match normalize(cell).as_str() {
            "acquired" | "downloaded" => Self::Acquired,
            _ => Self::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Acquired => "acquired",
        }
    }
}

/// Transcription state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionStatus {
    #[default]
    Pending,
    Transcribed,
}

impl TranscriptionStatus {
    pub fn parse(cell: &str) -> Self {
        match normalize(cell).as_str() {
            "transcribed" => Self::Transcribed,
            _ => Self::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Transcribed => "transcribed",
        }
    }
}

/// Sidecar artifact state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SidecarStatus {
    #[default]
    Pending,
    Written,
}

impl SidecarStatus {
    pub fn parse(cell: &str) -> Self {
        match normalize(cell).as_str() {
            "written" | "yes" => Self::Written,
            _ => Self::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Written => "written",
        }
    }
}

impl fmt::Display for AcquisitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TranscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for SidecarStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize(cell: &str) -> String {
    cell.trim().to_ascii_lowercase()
}
