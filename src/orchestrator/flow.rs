//! Observable, retryable execution of one lifecycle action.

use std::sync::Arc;

use tokio::sync::watch;

use crate::types::OperationId;

use super::{
    machine::{FlowStatus, FlowView},
    steps::{LifecycleAction, Orchestrator, StepObserver},
};

impl StepObserver for watch::Sender<FlowView> {
    fn enter_step(&self, index: usize) {
        self.send_if_modified(|view| view.enter_step(index));
    }

    fn track_operation(&self, id: OperationId) {
        self.send_if_modified(|view| view.track_operation(id));
    }

    fn note(&self, message: &str) {
        self.send_if_modified(|view| view.note(message));
    }
}

/// One action bound to a view that UIs can watch.
///
/// At most one run is in flight: [`Flow::trigger`] starts from `Idle` or
/// `Failure` and [`Flow::retry`] only from `Failure`. Background polling is kept
/// active while a run executes.
#[derive(Clone)]
pub struct Flow {
    action: Arc<LifecycleAction>,
    orchestrator: Orchestrator,
    view_tx: Arc<watch::Sender<FlowView>>,
}

impl Flow {
    pub fn new(orchestrator: Orchestrator, action: LifecycleAction) -> Self {
        let (view_tx, _) = watch::channel(FlowView::new(action.steps()));
        Self {
            action: Arc::new(action),
            orchestrator,
            view_tx: Arc::new(view_tx),
        }
    }

    pub fn action(&self) -> &LifecycleAction {
        &self.action
    }

    /// Current view.
    pub fn view(&self) -> FlowView {
        self.view_tx.borrow().clone()
    }

    pub fn status(&self) -> FlowStatus {
        self.view_tx.borrow().status
    }

    pub fn subscribe(&self) -> watch::Receiver<FlowView> {
        self.view_tx.subscribe()
    }

    /// Starts the action. Returns `false` while running or after success.
    pub fn trigger(&self) -> bool {
        if !self.view_tx.send_if_modified(FlowView::begin) {
            tracing::debug!(action = ?self.action, "trigger ignored");
            return false;
        }
        self.spawn_run();
        true
    }

    /// Re-runs a failed action from its first step.
    pub fn retry(&self) -> bool {
        if !self.view_tx.send_if_modified(FlowView::begin_retry) {
            return false;
        }
        tracing::info!(attempt = self.view_tx.borrow().attempts, "retrying action");
        self.spawn_run();
        true
    }

    /// Returns a settled flow to `Idle`.
    pub fn reset(&self) -> bool {
        self.view_tx.send_if_modified(FlowView::reset)
    }

    /// Resolves once the flow is `Success` or `Failure`. Never resolves for
    /// a flow that is not started.
    pub async fn settled(&self) -> FlowView {
        let mut rx = self.view_tx.subscribe();
        match rx.wait_for(|view| view.status.is_settled()).await {
            Ok(view) => view.clone(),
            Err(_) => self.view(),
        }
    }

    /// [`Flow::trigger`] followed by [`Flow::settled`].
    pub async fn run_to_end(&self) -> FlowView {
        self.trigger();
        self.settled().await
    }

    fn spawn_run(&self) {
        let action = Arc::clone(&self.action);
        let orchestrator = self.orchestrator.clone();
        let view_tx = Arc::clone(&self.view_tx);

        tokio::spawn(async move {
            let lease = orchestrator.tracker().start_polling();
            let outcome = orchestrator.run(&action, &*view_tx).await;
            lease.stop().await;

            match outcome {
                Ok(message) => {
                    tracing::info!(%message, "action succeeded");
                    view_tx.send_if_modified(|view| view.succeed(message));
                }
                Err(err) => {
                    tracing::info!(error = %err, "action failed");
                    let reason = err.to_string();
                    view_tx.send_if_modified(|view| view.fail(&reason));
                }
            }
        });
    }
}
