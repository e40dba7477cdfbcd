//! Collaborator seams
//!
//! The orchestrator only ever sees these two traits. The HTTP interpreter and
//! the script-backed area calculator are the shipped implementations; tests
//! plug in scripted ones.

use async_trait::async_trait;

use super::types::InterpretedDocument;
use crate::error::{EstimatorError, InterpretationError};
use crate::takeoff::model::{AreaEstimate, DocumentInput};

/// Turns a document (plus cross-reference material) into a structured analysis.
///
/// `references` arrive in presentation order; the target is meant to be read
/// last. Implementations are high latency and rate limited.
#[async_trait]
pub trait InterpretationEngine: Send + Sync {
    async fn interpret(
        &self,
        target: &DocumentInput,
        references: &[&DocumentInput],
        context_digest: &str,
    ) -> Result<InterpretedDocument, InterpretationError>;
}

/// Vision-based area estimator. Optional; callers probe `is_available` first.
#[async_trait]
pub trait AreaEstimator: Send + Sync {
    async fn is_available(&self) -> bool;

    async fn estimate_area(
        &self,
        document: &DocumentInput,
        scale_hint: &str,
    ) -> Result<AreaEstimate, EstimatorError>;
}
