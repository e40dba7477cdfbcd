//! Integration Module
//!
//! Batch run entry point. Spawns the orchestrator on the tokio runtime and
//! hands back a [`BatchRun`]: a lazy event stream, a cancellation handle and
//! an immutable snapshot of the results produced so far.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::orchestrator::{AnalysisOrchestrator, BatchRequest, RunOutcome, RunState, RunUpdate};
use super::types::ProgressEvent;
use crate::error::TakeoffError;
use crate::takeoff::model::DocumentAnalysis;

/// Events of one run, in order. `Finished` is always the last item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event", content = "data")]
pub enum RunEvent {
    Started { total: usize },
    Progress(ProgressEvent),
    Finished(RunOutcome),
}

/// Handle to a spawned batch run
pub struct BatchRun {
    run_id: Uuid,
    cancel: CancellationToken,
    snapshot: watch::Receiver<Arc<Vec<DocumentAnalysis>>>,
    state: watch::Receiver<RunState>,
    events: Option<mpsc::UnboundedReceiver<RunEvent>>,
    handle: JoinHandle<RunOutcome>,
}

/// Start analyzing `request` in the background. Must be called from within
/// a tokio runtime.
pub fn start_batch(orchestrator: AnalysisOrchestrator, request: BatchRequest) -> BatchRun {
    let run_id = Uuid::new_v4();
    let cancel = CancellationToken::new();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(Vec::new()));
    let (state_tx, state_rx) = watch::channel(RunState::Idle);

    let token = cancel.clone();
    let span = tracing::info_span!("batch_run", run_id = %run_id);

    let handle = tokio::spawn(
        async move {
            let total = request.documents.len();
            let _ = event_tx.send(RunEvent::Started { total });

            let outcome = orchestrator
                .run(&request, &token, |update| match update {
                    RunUpdate::State(state) => {
                        state_tx.send_replace(state);
                    }
                    RunUpdate::Progress { event, results } => {
                        // Publish the snapshot before the event so listeners
                        // reacting to it already see the new record
                        snapshot_tx.send_replace(Arc::new(results.to_vec()));
                        let _ = event_tx.send(RunEvent::Progress(event));
                    }
                })
                .await;

            state_tx.send_replace(outcome.state());
            let _ = event_tx.send(RunEvent::Finished(outcome.clone()));
            outcome
        }
        .instrument(span),
    );

    BatchRun {
        run_id,
        cancel,
        snapshot: snapshot_rx,
        state: state_rx,
        events: Some(event_rx),
        handle,
    }
}

impl BatchRun {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Stop before the next document. The call in flight is not interrupted.
    pub fn cancel(&self) {
        tracing::info!("[Batch] Cancellation requested for run {}", self.run_id);
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Results completed so far. Never the live list.
    pub fn snapshot(&self) -> Arc<Vec<DocumentAnalysis>> {
        self.snapshot.borrow().clone()
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Lazy stream of run events ending with [`RunEvent::Finished`].
    ///
    /// The stream can be taken once; later calls yield an empty stream.
    pub fn events(&mut self) -> impl Stream<Item = RunEvent> + Send + 'static {
        futures::stream::unfold(self.events.take(), |receiver| async move {
            let mut receiver = receiver?;
            let event = receiver.recv().await?;
            Some((event, Some(receiver)))
        })
    }

    /// Wait for the run to end
    pub async fn wait(self) -> RunOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("[Batch] Run {} aborted: {}", self.run_id, e);
                let completed = Vec::clone(&self.snapshot.borrow());
                RunOutcome::Failed {
                    completed,
                    error: TakeoffError::Aborted(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::context::ContextMode;
    use crate::ai::orchestrator::tests::{docs, ScriptedInterpreter};
    use crate::ai::orchestrator::OrchestratorConfig;
    use crate::error::InterpretationError;
    use futures::StreamExt;

    fn orchestrator(interpreter: ScriptedInterpreter) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(Arc::new(interpreter), OrchestratorConfig::default())
    }

    #[tokio::test]
    async fn test_event_stream_is_ordered_and_terminal() {
        let request = BatchRequest::new(docs(&["a.pdf", "b.pdf"]), ContextMode::FullCrossReference);
        let mut run = start_batch(orchestrator(ScriptedInterpreter::default()), request);
        assert_eq!(run.state(), RunState::Idle);

        let events: Vec<RunEvent> = run.events().collect().await;

        assert_eq!(events.len(), 4);
        assert_eq!(events[0], RunEvent::Started { total: 2 });
        assert!(matches!(&events[1], RunEvent::Progress(p) if p.index == 0 && p.document_name == "a.pdf"));
        assert!(matches!(&events[2], RunEvent::Progress(p) if p.index == 1));
        match &events[3] {
            RunEvent::Finished(RunOutcome::Completed { results }) => assert_eq!(results.len(), 2),
            other => panic!("unexpected terminal event: {other:?}"),
        }

        assert_eq!(run.snapshot().len(), 2);
        assert_eq!(run.state(), RunState::Completed);
        assert_eq!(run.wait().await.results().len(), 2);
    }

    #[tokio::test]
    async fn test_events_can_only_be_taken_once() {
        let mut run = start_batch(orchestrator(ScriptedInterpreter::default()), BatchRequest::default());
        let first: Vec<RunEvent> = run.events().collect().await;
        let second: Vec<RunEvent> = run.events().collect().await;
        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_failure_keeps_partial_results() {
        let mut interpreter = ScriptedInterpreter::default();
        interpreter.failures.insert(
            "b.pdf".to_string(),
            InterpretationError::Upstream {
                status: 500,
                body: "internal".to_string(),
            },
        );
        let request = BatchRequest::new(docs(&["a.pdf", "b.pdf", "c.pdf"]), ContextMode::Sequential);
        let mut run = start_batch(orchestrator(interpreter), request);

        let last = run.events().collect::<Vec<_>>().await.pop();
        assert!(matches!(last, Some(RunEvent::Finished(RunOutcome::Failed { .. }))));
        assert_eq!(run.state(), RunState::Failed);
        assert_eq!(run.snapshot().len(), 1);

        let outcome = run.wait().await;
        assert_eq!(outcome.results().len(), 1);
        assert!(outcome.error().is_some_and(|e| e.is_fatal()));
    }

    #[tokio::test]
    async fn test_cancel_before_first_document() {
        let request = BatchRequest::new(docs(&["a.pdf", "b.pdf"]), ContextMode::FullCrossReference);
        let run = start_batch(orchestrator(ScriptedInterpreter::default()), request);

        // Current-thread runtime: the task has not been polled yet
        run.cancel();
        assert!(run.cancellation_token().is_cancelled());

        let outcome = run.wait().await;
        assert_eq!(outcome, RunOutcome::Cancelled { results: Vec::new() });
    }

    #[test]
    fn test_event_serialization() {
        let event = RunEvent::Progress(ProgressEvent {
            index: 0,
            total: 3,
            document_name: "a.pdf".to_string(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "progress");
        assert_eq!(json["data"]["documentName"], "a.pdf");
    }
}
