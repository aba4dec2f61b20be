use std::sync::Arc;

use relay_types::error::{EngineError, RepositoryError};
use relay_types::reaction::ReactionOutput;
use relay_types::workflow::{Workflow, WorkflowId};

use super::credentials::CycleCredentials;
use super::guard::WorkflowGuard;
use super::handshake::{Signal, SignalReceiver};
use super::{Liveness, check_liveness, report_handler_error};
use crate::handler::registry::HandlerRegistry;
use crate::handler::{ReactionContext, ReactionOutcome};
use crate::repository::credential::CredentialRepository;
use crate::repository::reaction_output::ReactionOutputRepository;
use crate::repository::workflow::WorkflowRepository;

/// The dispatching half of a running workflow.
///
/// `CheckLiveness -> AwaitSignal -> Evaluate -> (Invoke | Skip)`, until the
/// workflow is gone, the action cycle terminates or abandons it, or the
/// guard is cancelled.
pub(crate) struct ReactionCycle<W, C, R> {
    pub(crate) workflow_id: WorkflowId,
    pub(crate) workflows: Arc<W>,
    pub(crate) outputs: Arc<R>,
    pub(crate) registry: Arc<HandlerRegistry>,
    pub(crate) guard: Arc<WorkflowGuard>,
    pub(crate) signal: SignalReceiver,
    pub(crate) credentials: CycleCredentials<C>,
}

impl<W, C, R> ReactionCycle<W, C, R>
where
    W: WorkflowRepository,
    C: CredentialRepository,
    R: ReactionOutputRepository,
{
    pub(crate) async fn run(mut self) {
        let _cancel_sibling = self.guard.cancel_on_drop();
        tracing::debug!("reaction cycle started");

        loop {
            if self.guard.is_cancelled() {
                break;
            }

            // On a store error keep waiting: the action cycle owns the retry
            // delay and will terminate the handshake if the workflow is gone.
            if let Liveness::Gone = check_liveness(self.workflows.as_ref(), &self.workflow_id).await
            {
                break;
            }

            let signal = tokio::select! {
                _ = self.guard.cancelled() => break,
                signal = self.signal.recv() => signal,
            };
            match signal {
                Some(Signal::CycleComplete) => {}
                Some(Signal::Terminated) => {
                    tracing::debug!("terminated by action cycle");
                    break;
                }
                None => {
                    tracing::warn!("action cycle abandoned the workflow");
                    break;
                }
            }

            if let Err(err) = self.dispatch().await {
                tracing::error!(error = %err, "reaction cycle cannot continue");
                break;
            }
        }

        tracing::debug!("reaction cycle stopped");
    }

    /// Evaluate the trigger flag and run the reaction when it is set.
    async fn dispatch(&mut self) -> Result<(), EngineError> {
        let Some(workflow) = self.evaluate().await else {
            return Ok(());
        };

        let reaction = &workflow.reaction;
        let registry = Arc::clone(&self.registry);
        let handler = registry
            .resolve_reaction(&reaction.service, &reaction.operation)
            .ok_or_else(|| EngineError::UnknownHandler(reaction.key()))?;

        if self.guard.is_cancelled() {
            return Ok(());
        }
        self.credentials.refresh_if_stale(&workflow.user_id).await;

        let ctx = ReactionContext {
            workflow_id: workflow.id,
            user_id: workflow.user_id,
            options: &reaction.options,
            credentials: self.credentials.tokens(),
        };
        match handler.execute(ctx).await {
            Ok(outcome) => {
                if let Err(err) = self.acknowledge(outcome).await {
                    tracing::warn!(error = %err, "failed to persist reaction outcome");
                }
            }
            Err(err) => {
                // The flag stays set; the next signal retries the reaction.
                if report_handler_error("reaction", &err) {
                    self.credentials.invalidate();
                }
            }
        }
        Ok(())
    }

    /// Reload the record under the lock. `Some` only when the reaction must run.
    async fn evaluate(&self) -> Option<Workflow> {
        let _lock = self.guard.lock().await;
        match self.workflows.load(&self.workflow_id).await {
            Ok(Some(workflow)) if workflow.active && workflow.trigger_flag => Some(workflow),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load workflow for evaluation");
                None
            }
        }
    }

    /// Clear the flag and store the output under the lock.
    ///
    /// The flag is only ever written `true -> false` here; a record whose
    /// flag is already clear is left untouched. Nothing is written once the
    /// workflow was stopped or disabled, so the trigger stays pending.
    async fn acknowledge(&self, outcome: ReactionOutcome) -> Result<(), RepositoryError> {
        let _lock = self.guard.lock().await;
        let Some(mut current) = self.workflows.load(&self.workflow_id).await? else {
            return Ok(());
        };
        if self.guard.is_cancelled() || !current.active {
            tracing::debug!("workflow stopped during reaction, trigger left set");
            return Ok(());
        }
        if !current.trigger_flag {
            return Ok(());
        }

        current.trigger_flag = false;
        self.workflows.update_trigger_flag(&current).await?;

        if let Some(payload) = outcome.output {
            let output = ReactionOutput::new(current.id, current.user_id, payload);
            self.outputs.save_latest(&output).await?;
        }
        tracing::info!("reaction dispatched, trigger cleared");
        Ok(())
    }
}
