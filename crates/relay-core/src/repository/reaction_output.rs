//! Reaction output repository trait definition.

use relay_types::error::RepositoryError;
use relay_types::reaction::ReactionOutput;
use relay_types::workflow::{UserId, WorkflowId};

/// Keeps the latest reaction output of every workflow.
pub trait ReactionOutputRepository: Send + Sync {
    /// Upsert by workflow ID; the previous output is replaced.
    fn save_latest(
        &self,
        output: &ReactionOutput,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn latest(
        &self,
        workflow_id: &WorkflowId,
    ) -> impl std::future::Future<Output = Result<Option<ReactionOutput>, RepositoryError>> + Send;

    /// Latest output of each of the user's workflows, newest first.
    fn latest_for_user(
        &self,
        user_id: &UserId,
    ) -> impl std::future::Future<Output = Result<Vec<ReactionOutput>, RepositoryError>> + Send;
}
