//! Workflow domain types for Relay.
//!
//! A `Workflow` is the persisted binding of one action (a polled condition on
//! an external service) to one reaction (an effect on another external
//! service) for one user. The engine drives it through two cooperating cycles
//! until it is deactivated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique identifier for a workflow, wrapping a UUID v7 (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkflowId(pub Uuid);

impl WorkflowId {
    /// Create a new WorkflowId using UUID v7.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create a WorkflowId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkflowId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Identifier of the user owning workflows and service tokens.
///
/// Users themselves are managed outside the engine; only the reference is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Handler descriptors
// ---------------------------------------------------------------------------

/// Registry key of a handler: the external service plus the operation name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandlerKey {
    pub service: String,
    pub operation: String,
}

impl HandlerKey {
    pub fn new(service: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
        }
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.service, self.operation)
    }
}

impl FromStr for HandlerKey {
    type Err = String;

    /// Parse the `service.operation` form used on the command line.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((service, operation)) if !service.is_empty() && !operation.is_empty() => {
                Ok(Self::new(service, operation))
            }
            _ => Err(format!("expected 'service.operation', got '{s}'")),
        }
    }
}

/// One side of a workflow: which handler to run and its opaque options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerDescriptor {
    pub service: String,
    pub operation: String,
    /// Handler-specific options. Opaque to the engine.
    #[serde(default)]
    pub options: serde_json::Value,
}

impl HandlerDescriptor {
    pub fn new(
        service: impl Into<String>,
        operation: impl Into<String>,
        options: serde_json::Value,
    ) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
            options,
        }
    }

    /// The registry key this descriptor resolves through.
    pub fn key(&self) -> HandlerKey {
        HandlerKey::new(&self.service, &self.operation)
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A persisted action → reaction binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub user_id: UserId,
    pub name: String,
    /// Cleared when the user disables the workflow. Both cycles poll it.
    pub active: bool,
    pub action: HandlerDescriptor,
    pub reaction: HandlerDescriptor,
    /// Set by the action side, cleared by the reaction side. Nobody else writes it.
    pub trigger_flag: bool,
    /// Handler-owned state carried between action polls (baselines, counts).
    #[serde(default)]
    pub accumulated_state: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Build a fresh workflow: active, trigger cleared, empty state.
    pub fn new(
        user_id: UserId,
        name: impl Into<String>,
        action: HandlerDescriptor,
        reaction: HandlerDescriptor,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::new(),
            user_id,
            name: name.into(),
            active: true,
            action,
            reaction,
            trigger_flag: false,
            accumulated_state: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Request payload for creating a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWorkflowRequest {
    pub user_id: UserId,
    /// Empty or missing names are replaced by a generated "Workflow N".
    #[serde(default)]
    pub name: Option<String>,
    pub action: HandlerDescriptor,
    pub reaction: HandlerDescriptor,
}
