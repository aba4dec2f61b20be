//! Execution supervisor: starts and tracks the cycle pairs.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use relay_types::credential::ServiceToken;
use relay_types::workflow::{Workflow, WorkflowId};
use tracing::{Instrument, info_span};

use super::action_cycle::ActionCycle;
use super::credentials::CycleCredentials;
use super::guard::WorkflowGuard;
use super::handshake;
use super::reaction_cycle::ReactionCycle;
use crate::handler::registry::HandlerRegistry;
use crate::repository::credential::CredentialRepository;
use crate::repository::reaction_output::ReactionOutputRepository;
use crate::repository::workflow::WorkflowRepository;

type RunningMap = DashMap<WorkflowId, Arc<WorkflowGuard>>;

const SHUTDOWN_POLL: Duration = Duration::from_millis(20);

/// Launches the action and reaction cycles of workflows.
///
/// Holds one [`WorkflowGuard`] per running workflow. The entry is removed
/// once both cycles of that workflow have exited, whatever the reason.
pub struct Supervisor<W, C, R> {
    workflows: Arc<W>,
    credentials: Arc<C>,
    outputs: Arc<R>,
    registry: Arc<HandlerRegistry>,
    poll_interval: Duration,
    running: Arc<RunningMap>,
}

impl<W, C, R> Supervisor<W, C, R>
where
    W: WorkflowRepository + 'static,
    C: CredentialRepository + 'static,
    R: ReactionOutputRepository + 'static,
{
    pub fn new(
        workflows: Arc<W>,
        credentials: Arc<C>,
        outputs: Arc<R>,
        registry: Arc<HandlerRegistry>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            workflows,
            credentials,
            outputs,
            registry,
            poll_interval,
            running: Arc::new(DashMap::new()),
        }
    }

    /// Spawn both cycles for `workflow` and return immediately.
    ///
    /// `credentials` are the owner's tokens, resolved by the caller. Returns
    /// `false` without spawning anything if the workflow is already running.
    /// If a stopped pair of this workflow is still winding down, the new pair
    /// waits for it to exit before its first iteration.
    /// Must be called from within a tokio runtime.
    pub fn start(&self, workflow: &Workflow, credentials: Vec<ServiceToken>) -> bool {
        let workflow_id = workflow.id;
        let guard = Arc::new(WorkflowGuard::new(2));

        let previous = match self.running.entry(workflow_id) {
            Entry::Occupied(mut entry) => {
                if !entry.get().is_cancelled() {
                    tracing::debug!(%workflow_id, "workflow already running");
                    return false;
                }
                // The old pair only ever removes its own guard.
                tracing::debug!(%workflow_id, "previous cycles still winding down");
                Some(entry.insert(Arc::clone(&guard)))
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&guard));
                None
            }
        };

        let (sender, receiver) = handshake::channel();

        let action = ActionCycle {
            workflow_id,
            workflows: Arc::clone(&self.workflows),
            registry: Arc::clone(&self.registry),
            guard: Arc::clone(&guard),
            signal: sender,
            credentials: CycleCredentials::new(Arc::clone(&self.credentials), credentials.clone()),
            poll_interval: self.poll_interval,
        };
        let reaction = ReactionCycle {
            workflow_id,
            workflows: Arc::clone(&self.workflows),
            outputs: Arc::clone(&self.outputs),
            registry: Arc::clone(&self.registry),
            guard: Arc::clone(&guard),
            signal: receiver,
            credentials: CycleCredentials::new(Arc::clone(&self.credentials), credentials),
        };

        let span = info_span!(
            "workflow",
            %workflow_id,
            action = %workflow.action.key(),
            reaction = %workflow.reaction.key(),
        );

        let lease = self.lease(workflow_id, &guard);
        let predecessor = previous.clone();
        tokio::spawn(
            async move {
                let _lease = lease;
                wait_for_exit(predecessor).await;
                action.run().await;
            }
            .instrument(span.clone()),
        );

        let lease = self.lease(workflow_id, &guard);
        tokio::spawn(
            async move {
                let _lease = lease;
                wait_for_exit(previous).await;
                reaction.run().await;
            }
            .instrument(span),
        );

        tracing::info!(%workflow_id, name = %workflow.name, "workflow started");
        true
    }

    /// Cancel a running workflow. Both cycles stop at their next suspension
    /// point. Returns `false` if it was not running.
    pub fn stop(&self, workflow_id: &WorkflowId) -> bool {
        match self.running.get(workflow_id) {
            Some(guard) => {
                guard.cancel();
                tracing::info!(%workflow_id, "workflow stop requested");
                true
            }
            None => false,
        }
    }

    /// Cancel every running workflow.
    pub fn stop_all(&self) {
        for entry in self.running.iter() {
            entry.value().cancel();
        }
    }

    /// Cancel every running workflow and wait up to `timeout` for all cycles
    /// to exit. Returns `false` if some were still winding down.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.stop_all();
        let deadline = tokio::time::Instant::now() + timeout;
        while !self.running.is_empty() {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(
                    remaining = self.running.len(),
                    "workflow cycles still running at shutdown"
                );
                return false;
            }
            tokio::time::sleep(SHUTDOWN_POLL).await;
        }
        true
    }

    pub fn is_running(&self, workflow_id: &WorkflowId) -> bool {
        self.running
            .get(workflow_id)
            .is_some_and(|guard| !guard.is_cancelled())
    }

    /// Number of workflows with live, uncancelled cycles.
    pub fn running_count(&self) -> usize {
        self.running
            .iter()
            .filter(|entry| !entry.value().is_cancelled())
            .count()
    }

    fn lease(&self, workflow_id: WorkflowId, guard: &Arc<WorkflowGuard>) -> CycleLease {
        CycleLease {
            running: Arc::clone(&self.running),
            workflow_id,
            guard: Arc::clone(guard),
        }
    }
}

/// Holds a restarted pair back until the pair it replaces has exited, so a
/// workflow never has two pairs running handlers or writing the store.
async fn wait_for_exit(previous: Option<Arc<WorkflowGuard>>) {
    if let Some(previous) = previous {
        previous.exited().await;
    }
}

/// Held by each cycle task; the last one dropped unregisters the workflow.
struct CycleLease {
    running: Arc<RunningMap>,
    workflow_id: WorkflowId,
    guard: Arc<WorkflowGuard>,
}

impl Drop for CycleLease {
    fn drop(&mut self) {
        self.guard.cancel();
        if self.guard.release() {
            self.running
                .remove_if(&self.workflow_id, |_, current| Arc::ptr_eq(current, &self.guard));
            tracing::debug!(workflow_id = %self.workflow_id, "workflow cycles exited");
        }
    }
}
