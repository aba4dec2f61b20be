use std::sync::Arc;
use std::time::Duration;

use relay_types::error::{EngineError, RepositoryError};
use relay_types::workflow::{Workflow, WorkflowId};

use super::credentials::CycleCredentials;
use super::guard::WorkflowGuard;
use super::handshake::{Signal, SignalSender};
use super::{Liveness, check_liveness, report_handler_error};
use crate::handler::registry::HandlerRegistry;
use crate::handler::{ActionContext, ActionOutcome, TriggerDecision};
use crate::repository::credential::CredentialRepository;
use crate::repository::workflow::WorkflowRepository;

/// The polling half of a running workflow.
///
/// `CheckLiveness -> Poll -> Signal -> delay`, until the workflow is gone or
/// the guard is cancelled.
pub(crate) struct ActionCycle<W, C> {
    pub(crate) workflow_id: WorkflowId,
    pub(crate) workflows: Arc<W>,
    pub(crate) registry: Arc<HandlerRegistry>,
    pub(crate) guard: Arc<WorkflowGuard>,
    pub(crate) signal: SignalSender,
    pub(crate) credentials: CycleCredentials<C>,
    pub(crate) poll_interval: Duration,
}

impl<W: WorkflowRepository, C: CredentialRepository> ActionCycle<W, C> {
    pub(crate) async fn run(mut self) {
        let _cancel_sibling = self.guard.cancel_on_drop();
        tracing::debug!("action cycle started");

        loop {
            if self.guard.is_cancelled() {
                break;
            }

            let workflow = match check_liveness(self.workflows.as_ref(), &self.workflow_id).await {
                Liveness::Alive(workflow) => workflow,
                Liveness::Gone => {
                    self.terminate().await;
                    break;
                }
                Liveness::Unavailable => {
                    if !self.pause().await {
                        break;
                    }
                    continue;
                }
            };

            if let Err(err) = self.poll(&workflow).await {
                tracing::error!(error = %err, "action cycle cannot continue");
                break;
            }

            let sent = tokio::select! {
                _ = self.guard.cancelled() => break,
                sent = self.signal.send(Signal::CycleComplete) => sent,
            };
            if sent.is_err() {
                tracing::warn!("reaction cycle abandoned the workflow");
                break;
            }

            if !self.pause().await {
                break;
            }
        }

        tracing::debug!("action cycle stopped");
    }

    /// Invoke the action handler and apply its outcome.
    ///
    /// Handler and store failures are logged and end the iteration; only an
    /// unresolvable handler is returned.
    async fn poll(&mut self, workflow: &Workflow) -> Result<(), EngineError> {
        let action = &workflow.action;
        let registry = Arc::clone(&self.registry);
        let handler = registry
            .resolve_action(&action.service, &action.operation)
            .ok_or_else(|| EngineError::UnknownHandler(action.key()))?;

        self.credentials.refresh_if_stale(&workflow.user_id).await;

        let ctx = ActionContext {
            workflow_id: workflow.id,
            user_id: workflow.user_id,
            options: &action.options,
            state: &workflow.accumulated_state,
            credentials: self.credentials.tokens(),
        };
        let outcome = match handler.evaluate(ctx).await {
            Ok(outcome) => outcome,
            Err(err) => {
                if report_handler_error("action", &err) {
                    self.credentials.invalidate();
                }
                return Ok(());
            }
        };

        if let Err(err) = self.apply(outcome).await {
            tracing::warn!(error = %err, "failed to persist action outcome");
        }
        Ok(())
    }

    /// Persist the outcome under the record lock.
    ///
    /// The flag is only ever written `false -> true` here; a fire decision on
    /// an already set flag refreshes the state alone. An outcome that arrives
    /// after the workflow was stopped or disabled is dropped.
    async fn apply(&self, outcome: ActionOutcome) -> Result<(), RepositoryError> {
        let _lock = self.guard.lock().await;
        let Some(mut current) = self.workflows.load(&self.workflow_id).await? else {
            return Ok(());
        };
        if self.guard.is_cancelled() || !current.active {
            tracing::debug!("workflow stopped during poll, outcome dropped");
            return Ok(());
        }

        current.accumulated_state = outcome.state;
        if outcome.decision == TriggerDecision::Fire && !current.trigger_flag {
            current.trigger_flag = true;
            self.workflows.update_state_and_trigger(&current).await?;
            tracing::info!("trigger set");
        } else {
            self.workflows.update_state(&current).await?;
        }
        Ok(())
    }

    /// Tell the reaction cycle to stop. It may already be gone.
    async fn terminate(&self) {
        tokio::select! {
            _ = self.guard.cancelled() => {}
            _ = self.signal.send(Signal::Terminated) => {}
        }
    }

    /// Sleep for one poll interval. Returns `false` if cancelled meanwhile.
    async fn pause(&self) -> bool {
        tokio::select! {
            _ = self.guard.cancelled() => false,
            _ = tokio::time::sleep(self.poll_interval) => true,
        }
    }
}
