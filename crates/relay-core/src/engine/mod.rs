//! Workflow execution engine.
//!
//! Every running workflow is driven by two tokio tasks:
//!
//! - the **action cycle** polls the action handler, persists its state and,
//!   when the handler fires, sets the trigger flag;
//! - the **reaction cycle** waits for the action cycle's signal, and when the
//!   flag is set runs the reaction handler and clears the flag.
//!
//! Both tasks share one [`guard::WorkflowGuard`] (record lock plus
//! cancellation token) and one [`handshake`] channel. The [`supervisor`]
//! spawns them and tracks which workflows are running.

pub mod guard;
pub mod handshake;
pub mod supervisor;

mod action_cycle;
mod credentials;
mod reaction_cycle;

#[cfg(test)]
mod tests;

use relay_types::error::HandlerError;
use relay_types::workflow::{Workflow, WorkflowId};

use crate::repository::workflow::WorkflowRepository;

/// Result of a cycle's liveness check.
enum Liveness {
    Alive(Workflow),
    /// Deleted or deactivated.
    Gone,
    /// The store could not be read; try again later.
    Unavailable,
}

async fn check_liveness<W: WorkflowRepository>(store: &W, id: &WorkflowId) -> Liveness {
    match store.load(id).await {
        Ok(Some(workflow)) if workflow.active => Liveness::Alive(workflow),
        Ok(Some(_)) => {
            tracing::info!("workflow deactivated");
            Liveness::Gone
        }
        Ok(None) => {
            tracing::info!("workflow removed");
            Liveness::Gone
        }
        Err(err) => {
            tracing::warn!(error = %err, "liveness check failed");
            Liveness::Unavailable
        }
    }
}

/// Log a handler failure. Returns `true` when credentials must be re-fetched.
fn report_handler_error(side: &'static str, err: &HandlerError) -> bool {
    match err {
        HandlerError::Transient(_) => {
            tracing::warn!(side, error = %err, "handler failed, retrying next cycle");
            false
        }
        HandlerError::Unauthorized(_) => {
            tracing::warn!(side, error = %err, "handler unauthorized, re-fetching credentials");
            true
        }
        HandlerError::MalformedState(_) => {
            tracing::error!(side, error = %err, "handler rejected its options or state");
            false
        }
    }
}
