//! Action and reaction handler contracts.
//!
//! A handler is a stateless unit bound to one `(service, operation)` key. It
//! performs exactly one round trip to its external service per invocation and
//! never touches the workflow store: it returns a decision and the cycle that
//! invoked it applies the corresponding write.

pub mod box_handler;
pub mod registry;

use relay_types::credential::{ServiceToken, token_for};
use relay_types::error::HandlerError;
use relay_types::workflow::{UserId, WorkflowId};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Everything an action handler may look at during one poll.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub workflow_id: WorkflowId,
    pub user_id: UserId,
    /// The action descriptor's options.
    pub options: &'a Value,
    /// State returned by the previous poll (`Null` on the first one).
    pub state: &'a Value,
    pub credentials: &'a [ServiceToken],
}

/// Everything a reaction handler may look at during one dispatch.
#[derive(Debug, Clone, Copy)]
pub struct ReactionContext<'a> {
    pub workflow_id: WorkflowId,
    pub user_id: UserId,
    /// The reaction descriptor's options.
    pub options: &'a Value,
    pub credentials: &'a [ServiceToken],
}

/// Whether the observed condition should set the trigger flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    Fire,
    Hold,
}

/// Result of one action poll.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub decision: TriggerDecision,
    /// Replaces the workflow's accumulated state.
    pub state: Value,
}

impl ActionOutcome {
    pub fn fire(state: Value) -> Self {
        Self {
            decision: TriggerDecision::Fire,
            state,
        }
    }

    pub fn hold(state: Value) -> Self {
        Self {
            decision: TriggerDecision::Hold,
            state,
        }
    }
}

/// Result of one reaction dispatch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReactionOutcome {
    /// Stored as the workflow's latest reaction output when present.
    pub output: Option<Value>,
}

impl ReactionOutcome {
    pub fn with_output(output: Value) -> Self {
        Self {
            output: Some(output),
        }
    }
}

/// Polls one external condition.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
/// For dynamic dispatch see [`box_handler::BoxActionHandler`].
pub trait ActionHandler: Send + Sync {
    fn evaluate(
        &self,
        ctx: ActionContext<'_>,
    ) -> impl std::future::Future<Output = Result<ActionOutcome, HandlerError>> + Send;
}

/// Performs one external effect.
pub trait ReactionHandler: Send + Sync {
    fn execute(
        &self,
        ctx: ReactionContext<'_>,
    ) -> impl std::future::Future<Output = Result<ReactionOutcome, HandlerError>> + Send;
}

/// Deserialize handler options, mapping failures to `MalformedState`.
pub fn parse_options<T: DeserializeOwned>(options: &Value) -> Result<T, HandlerError> {
    serde_json::from_value(options.clone())
        .map_err(|e| HandlerError::malformed(format!("invalid options: {e}")))
}

/// The bearer token stored for `service`, or `Unauthorized` when none is.
pub fn bearer_token<'a>(
    credentials: &'a [ServiceToken],
    service: &str,
) -> Result<&'a str, HandlerError> {
    token_for(credentials, service)
        .map(|t| t.token.expose())
        .ok_or_else(|| HandlerError::unauthorized(format!("no {service} token stored")))
}
