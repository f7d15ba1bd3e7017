//! Word-level timed tokens produced by transcription.

use serde::{Deserialize, Serialize};

/// A single transcribed word with its start/end offsets in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedToken {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

impl TimedToken {
    /// Create a token; `end` is clamped so that `start <= end` always holds
    pub fn new(word: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            word: word.into(),
            start,
            end: end.max(start),
        }
    }
}

/// Join token words in emission order with a single space
pub fn join_transcript(tokens: &[TimedToken]) -> String {
    tokens
        .iter()
        .map(|t| t.word.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
