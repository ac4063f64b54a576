use thiserror::Error;

use crate::labeling::LabelResult;

/// Failures while building the company registry. Always fatal for a run.
#[derive(Error, Debug)]
pub enum RegistryLoadError {
    #[error("Failed to read registry: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode registry CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing required column(s): {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Line {line}: ticker is blank")]
    BlankTicker { line: u64 },

    #[error("Line {line}: invalid ticker '{ticker}'")]
    InvalidTicker { line: u64, ticker: String },

    #[error("Line {line}: ticker {ticker} has no company name")]
    MissingName { line: u64, ticker: String },

    #[error("Line {line}: ticker {ticker} maps to both '{existing}' and '{incoming}'")]
    ConflictingEntry {
        line: u64,
        ticker: String,
        existing: String,
        incoming: String,
    },

    #[error("Registry contains no entries")]
    Empty,
}

/// Failures reported by a model backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Model backend unavailable: {0}")]
    Unavailable(String),

    #[error("Model backend timed out after {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },
}

impl BackendError {
    /// Connectivity errors are worth a bounded number of reconnect attempts
    /// inside a backend. Timeouts are not: the model is already busy.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Unavailable(_))
    }
}

/// Per-attempt problems with model output. Retried, then degraded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LabelFault {
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("Invalid label: {field} - {message}")]
    Invalid { field: String, message: String },
}

impl LabelFault {
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        LabelFault::MalformedOutput(message.into())
    }

    pub fn invalid<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        LabelFault::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// The labeling run stopped because the backend went away. Results finished
/// before the failure are kept so the caller can persist them and resume.
#[derive(Error, Debug)]
#[error("Labeling aborted after {} completed record(s): {}", .completed.len(), .cause)]
pub struct LabelingAborted {
    pub cause: BackendError,
    pub completed: Vec<LabelResult>,
}
