//! Roofing material take-off from batches of construction documents.
//!
//! Each document of a batch is interpreted by an external engine, with the
//! rest of the batch (or a digest of earlier results) as context. Relevant
//! documents get their total area cross-checked against a vision estimate.
//! The per-document results then consolidate into building-level totals
//! and can be exported as JSON or CSV.

pub mod ai;
pub mod config;
pub mod error;
pub mod takeoff;
pub mod vision;

pub use ai::{start_batch, AnalysisOrchestrator, BatchRequest, BatchRun, ContextMode, RunEvent, RunOutcome};
pub use config::TakeoffConfig;
pub use error::{EstimatorError, InterpretationError, TakeoffError};
pub use takeoff::{consolidate, BuildingSummary, DocumentAnalysis, DocumentInput};

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`, defaulting to
/// `roof_takeoff=info`. Does nothing if a subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("roof_takeoff=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
