//! Analysis Orchestrator
//!
//! Drives one batch run, strictly one document at a time:
//!
//! 1. build the context package for the target
//! 2. interpret it (fatal on failure, bounded by a timeout)
//! 3. for relevant documents with a total area, ask the vision estimator
//!    for a secondary figure (best effort, shorter timeout)
//! 4. reconcile and attach the validation record
//! 5. append the finished record and report progress
//!
//! The result list is owned here for the duration of the run. Observers only
//! ever see it as a shared slice between appends.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::context::{BatchContextBuilder, ContextMode};
use super::engine::{AreaEstimator, InterpretationEngine};
use super::types::ProgressEvent;
use crate::error::{EstimatorError, InterpretationError, TakeoffError};
use crate::takeoff::model::{DocumentAnalysis, DocumentInput, ValidationRecord};
use crate::takeoff::validation::{reconcile, DEFAULT_TOLERANCE_PERCENT, SECONDARY_UNAVAILABLE};
use crate::vision::scale::normalize_scale_hint;

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Deviation (percent) under which the primary area is validated
    pub tolerance_percent: f64,
    /// Upper bound for one interpretation call
    pub interpretation_timeout: Duration,
    /// Upper bound for one estimator call (and the availability probe)
    pub estimator_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tolerance_percent: DEFAULT_TOLERANCE_PERCENT,
            interpretation_timeout: Duration::from_secs(180),
            estimator_timeout: Duration::from_secs(60),
        }
    }
}

/// Lifecycle of a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum RunState {
    Idle,
    Running { index: usize },
    Completed,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// One batch to analyze
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    pub documents: Vec<DocumentInput>,
    /// Fixed reference documents (sequential mode only)
    pub context_documents: Vec<DocumentInput>,
    pub mode: ContextMode,
    /// Whether sequential mode feeds a digest of earlier results
    pub context_enabled: bool,
}

impl BatchRequest {
    pub fn new(documents: Vec<DocumentInput>, mode: ContextMode) -> Self {
        Self {
            documents,
            context_documents: Vec::new(),
            mode,
            context_enabled: true,
        }
    }

    pub fn with_context_documents(mut self, documents: Vec<DocumentInput>, context_enabled: bool) -> Self {
        self.context_documents = documents;
        self.context_enabled = context_enabled;
        self
    }
}

/// Notifications handed to the run observer
#[derive(Debug)]
pub enum RunUpdate<'a> {
    State(RunState),
    /// A document finished; `results` is the list including it
    Progress {
        event: ProgressEvent,
        results: &'a [DocumentAnalysis],
    },
}

/// How a run ended. Completed records are preserved in every case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum RunOutcome {
    Completed { results: Vec<DocumentAnalysis> },
    Cancelled { results: Vec<DocumentAnalysis> },
    Failed {
        completed: Vec<DocumentAnalysis>,
        error: TakeoffError,
    },
}

impl RunOutcome {
    pub fn results(&self) -> &[DocumentAnalysis] {
        match self {
            Self::Completed { results } | Self::Cancelled { results } => results,
            Self::Failed { completed, .. } => completed,
        }
    }

    pub fn into_results(self) -> Vec<DocumentAnalysis> {
        match self {
            Self::Completed { results } | Self::Cancelled { results } => results,
            Self::Failed { completed, .. } => completed,
        }
    }

    pub fn error(&self) -> Option<&TakeoffError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn state(&self) -> RunState {
        match self {
            Self::Completed { .. } => RunState::Completed,
            Self::Cancelled { .. } => RunState::Cancelled,
            Self::Failed { .. } => RunState::Failed,
        }
    }
}

/// Runs batches against an interpretation engine and an optional estimator
#[derive(Clone)]
pub struct AnalysisOrchestrator {
    interpreter: Arc<dyn InterpretationEngine>,
    estimator: Option<Arc<dyn AreaEstimator>>,
    config: OrchestratorConfig,
}

impl AnalysisOrchestrator {
    pub fn new(interpreter: Arc<dyn InterpretationEngine>, config: OrchestratorConfig) -> Self {
        Self {
            interpreter,
            estimator: None,
            config,
        }
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn AreaEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Analyze every document of `request` in order.
    ///
    /// `cancel` is checked before each document; a call already in flight is
    /// left to finish. The observer sees state transitions and one progress
    /// update per appended record.
    pub async fn run<F>(
        &self,
        request: &BatchRequest,
        cancel: &CancellationToken,
        mut observer: F,
    ) -> RunOutcome
    where
        F: FnMut(RunUpdate<'_>) + Send,
    {
        let total = request.documents.len();
        let builder = BatchContextBuilder::new(&request.documents, request.mode)
            .with_context(&request.context_documents, request.context_enabled);

        tracing::info!(
            "[Orchestrator] Starting run: {} documents, mode {:?}, {} context documents",
            total,
            request.mode,
            request.context_documents.len()
        );

        let estimator = self.probe_estimator().await;
        let mut results: Vec<DocumentAnalysis> = Vec::with_capacity(total);

        for index in 0..total {
            if cancel.is_cancelled() {
                tracing::info!(
                    "[Orchestrator] Cancelled before document {}/{}, {} completed",
                    index + 1,
                    total,
                    results.len()
                );
                observer(RunUpdate::State(RunState::Cancelled));
                return RunOutcome::Cancelled { results };
            }

            observer(RunUpdate::State(RunState::Running { index }));

            match self.analyze_document(&builder, index, &results, estimator).await {
                Ok(analysis) => {
                    let event = ProgressEvent {
                        index,
                        total,
                        document_name: analysis.document_name.clone(),
                    };
                    results.push(analysis);
                    observer(RunUpdate::Progress {
                        event,
                        results: &results,
                    });
                }
                Err(error) => {
                    tracing::error!("[Orchestrator] {}", error);
                    observer(RunUpdate::State(RunState::Failed));
                    return RunOutcome::Failed {
                        completed: results,
                        error,
                    };
                }
            }
        }

        tracing::info!("[Orchestrator] Run completed: {} documents", results.len());
        observer(RunUpdate::State(RunState::Completed));
        RunOutcome::Completed { results }
    }

    /// Probe the estimator once per run
    async fn probe_estimator(&self) -> Option<&dyn AreaEstimator> {
        let estimator = self.estimator.as_deref()?;

        let available = tokio::time::timeout(self.config.estimator_timeout, estimator.is_available())
            .await
            .unwrap_or(false);

        if available {
            Some(estimator)
        } else {
            tracing::info!("[Orchestrator] Area estimator unavailable, validating against primary only");
            None
        }
    }

    async fn analyze_document(
        &self,
        builder: &BatchContextBuilder<'_>,
        index: usize,
        prior: &[DocumentAnalysis],
        estimator: Option<&dyn AreaEstimator>,
    ) -> Result<DocumentAnalysis, TakeoffError> {
        let package = builder.build(index, prior)?;
        let target = package.primary_document;

        tracing::debug!(
            "[Orchestrator] Document {}: {} ({} references)",
            index + 1,
            target.name,
            package.reference_documents.len()
        );

        let interpreted = match tokio::time::timeout(
            self.config.interpretation_timeout,
            self.interpreter
                .interpret(target, &package.reference_documents, &package.context_digest),
        )
        .await
        {
            Ok(Ok(interpreted)) => interpreted,
            Ok(Err(e)) => return Err(TakeoffError::interpretation(index, &target.name, e)),
            Err(_) => {
                return Err(TakeoffError::interpretation(
                    index,
                    &target.name,
                    InterpretationError::Timeout {
                        seconds: self.config.interpretation_timeout.as_secs(),
                    },
                ))
            }
        };

        let validation = match (interpreted.is_relevant, interpreted.total_area) {
            (true, Some(area)) => Some(self.validate(target, area, &interpreted.scale, estimator).await),
            _ => None,
        };

        Ok(interpreted.into_analysis(&target.name, validation))
    }

    /// Secondary estimate plus reconciliation. Estimator failures end up in
    /// the record's message, never in the run.
    async fn validate(
        &self,
        target: &DocumentInput,
        primary_area: f64,
        scale: &str,
        estimator: Option<&dyn AreaEstimator>,
    ) -> ValidationRecord {
        let tolerance = self.config.tolerance_percent;
        let Some(estimator) = estimator else {
            return reconcile(primary_area, None, tolerance);
        };

        let hint = normalize_scale_hint(scale);
        let secondary = match tokio::time::timeout(
            self.config.estimator_timeout,
            estimator.estimate_area(target, &hint),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(EstimatorError::Timeout {
                seconds: self.config.estimator_timeout.as_secs(),
            }),
        };

        match secondary {
            Ok(estimate) => {
                let record = reconcile(primary_area, Some(&estimate), tolerance);
                tracing::info!(
                    "[Orchestrator] {}: primary {:.1}, secondary {:.1} -> {}",
                    target.name,
                    record.primary_area,
                    estimate.area,
                    record.recommendation
                );
                record
            }
            Err(e) => {
                tracing::warn!("[Orchestrator] Area estimate for {} failed: {}", target.name, e);
                let mut record = reconcile(primary_area, None, tolerance);
                record.message = format!("{}: {}", SECONDARY_UNAVAILABLE, e);
                record
            }
        }
    }
}
