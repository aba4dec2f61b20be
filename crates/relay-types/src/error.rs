use thiserror::Error;

use crate::workflow::HandlerKey;

/// Errors from repository operations (used by trait definitions in relay-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The store could not be reached (pool closed or timed out, I/O).
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors returned by action and reaction handlers.
///
/// None of these reach a caller; the owning cycle logs them and decides
/// whether to retry, refresh credentials or skip the iteration.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Network failure, timeout or a 5xx answer. Retried on the next cycle.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The external service rejected the token, or no token is stored.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Options, accumulated state or the external response did not have the
    /// expected shape.
    #[error("malformed state: {0}")]
    MalformedState(String),
}

impl HandlerError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedState(msg.into())
    }
}

/// Failures of the workflow creation and management API.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow not found")]
    NotFound,

    #[error("unknown action '{0}'")]
    UnknownAction(HandlerKey),

    #[error("unknown reaction '{0}'")]
    UnknownReaction(HandlerKey),

    #[error("{}", already_exists_message(.active))]
    AlreadyExists { active: bool },

    #[error("invalid workflow name: {0}")]
    InvalidName(String),

    #[error("storage error: {0}")]
    StorageError(String),
}

impl From<RepositoryError> for WorkflowError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => WorkflowError::NotFound,
            other => WorkflowError::StorageError(other.to_string()),
        }
    }
}

fn already_exists_message(active: &bool) -> &'static str {
    if *active {
        "workflow already exists"
    } else {
        "workflow already exists but is disabled"
    }
}

/// Errors that end one cycle of a running workflow.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no handler registered for '{0}'")]
    UnknownHandler(HandlerKey),
}
