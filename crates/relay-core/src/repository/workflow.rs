//! Workflow repository trait definition.
//!
//! The engine relies on the targeted update methods so that the action side
//! and the reaction side never overwrite each other's columns: the action
//! cycle owns `accumulated_state` and the `false -> true` transition of the
//! trigger flag, the reaction cycle owns the `true -> false` transition.

use relay_types::error::RepositoryError;
use relay_types::workflow::{HandlerDescriptor, UserId, Workflow, WorkflowId};

/// Repository trait for workflow persistence.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait WorkflowRepository: Send + Sync {
    /// Load a workflow by ID. `None` once the record is gone.
    fn load(
        &self,
        id: &WorkflowId,
    ) -> impl std::future::Future<Output = Result<Option<Workflow>, RepositoryError>> + Send;

    /// Insert a new workflow record and return its ID.
    fn save(
        &self,
        workflow: &Workflow,
    ) -> impl std::future::Future<Output = Result<WorkflowId, RepositoryError>> + Send;

    /// Persist `workflow.trigger_flag` only.
    fn update_trigger_flag(
        &self,
        workflow: &Workflow,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Persist `workflow.accumulated_state` only.
    fn update_state(
        &self,
        workflow: &Workflow,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Persist `accumulated_state` and `trigger_flag` in one write.
    fn update_state_and_trigger(
        &self,
        workflow: &Workflow,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Active workflows owned by a user.
    fn find_active_by_user(
        &self,
        user_id: &UserId,
    ) -> impl std::future::Future<Output = Result<Vec<Workflow>, RepositoryError>> + Send;

    /// Every active workflow, across users. Used when resuming at start-up.
    fn find_all_active(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Workflow>, RepositoryError>> + Send;

    /// All workflows owned by a user, active or not, oldest first.
    fn find_by_user(
        &self,
        user_id: &UserId,
    ) -> impl std::future::Future<Output = Result<Vec<Workflow>, RepositoryError>> + Send;

    fn find_by_name(
        &self,
        user_id: &UserId,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Option<Workflow>, RepositoryError>> + Send;

    /// A workflow of the same user binding the same action and reaction
    /// descriptors (options included), if any.
    fn find_existing(
        &self,
        user_id: &UserId,
        action: &HandlerDescriptor,
        reaction: &HandlerDescriptor,
    ) -> impl std::future::Future<Output = Result<Option<Workflow>, RepositoryError>> + Send;

    /// Flip the `active` flag. Returns `RepositoryError::NotFound` for an unknown ID.
    fn set_active(
        &self,
        id: &WorkflowId,
        active: bool,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
