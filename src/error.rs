//! Error taxonomy
//!
//! Only [`InterpretationError`] is fatal to a batch run. Estimator failures
//! degrade validation and are folded into the affected document's
//! `ValidationRecord.message`. Cancellation is a run outcome, not an error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures of the document-interpretation engine
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "details")]
pub enum InterpretationError {
    /// Transport failure or client misconfiguration
    #[error("Request failed: {0}")]
    Request(String),

    /// Non-2xx status from upstream
    #[error("API error ({status}): {body}")]
    Upstream { status: u16, body: String },

    /// The engine answered without any content
    #[error("Interpretation engine returned an empty response")]
    EmptyResponse,

    /// The response could not be read as a document analysis
    #[error("Response does not match the analysis schema: {0}")]
    Schema(String),

    #[error("Interpretation timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

impl InterpretationError {
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Failures of the vision area estimator. Never propagated.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "details")]
pub enum EstimatorError {
    #[error("estimator unavailable")]
    Unavailable,

    #[error("estimator timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("estimator failed: {0}")]
    Failed(String),

    #[error("estimator output malformed: {0}")]
    Malformed(String),
}

/// Crate-level errors
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "details")]
pub enum TakeoffError {
    /// Interpretation of one document failed; the run stops there
    #[error("Analysis of '{document}' (document {position}) failed: {source}")]
    Interpretation {
        index: usize,
        position: usize,
        document: String,
        source: InterpretationError,
    },

    #[error("Document index {index} out of range for batch of {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Export failed: {0}")]
    Export(String),

    /// The run task ended without reporting an outcome
    #[error("Batch run aborted: {0}")]
    Aborted(String),
}

impl TakeoffError {
    pub(crate) fn interpretation(index: usize, document: &str, source: InterpretationError) -> Self {
        Self::Interpretation {
            index,
            position: index + 1,
            document: document.to_string(),
            source,
        }
    }

    /// Whether this error stopped a batch run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Interpretation { .. } | Self::Aborted(_))
    }
}
