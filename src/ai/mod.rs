//! Document interpretation and batch orchestration
//!
//! ```text
//!  BatchRequest ──► AnalysisOrchestrator ──► Vec<DocumentAnalysis>
//!                     │   per document:
//!                     ├─► BatchContextBuilder   (references + digest)
//!                     ├─► InterpretationEngine  (fatal on failure)
//!                     ├─► AreaEstimator         (optional, best effort)
//!                     └─► reconcile             (validation record)
//! ```
//!
//! `integration::start_batch` runs the orchestrator in the background and
//! exposes events, cancellation and result snapshots.

pub mod client;
pub mod context;
pub mod engine;
pub mod integration;
pub mod json_parser;
pub mod orchestrator;
pub mod prompts;
pub mod types;

pub use client::HttpInterpreter;
pub use context::{build_context_digest, BatchContextBuilder, ContextMode, ContextPackage};
pub use engine::{AreaEstimator, InterpretationEngine};
pub use integration::{start_batch, BatchRun, RunEvent};
pub use orchestrator::{
    AnalysisOrchestrator, BatchRequest, OrchestratorConfig, RunOutcome, RunState, RunUpdate,
};
pub use types::*;
