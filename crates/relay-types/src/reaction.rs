use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflow::{UserId, WorkflowId};

/// The latest output produced by a workflow's reaction.
///
/// Only one row per workflow is kept; a newer output replaces the older one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionOutput {
    pub workflow_id: WorkflowId,
    pub user_id: UserId,
    pub payload: serde_json::Value,
    pub produced_at: DateTime<Utc>,
}

impl ReactionOutput {
    pub fn new(workflow_id: WorkflowId, user_id: UserId, payload: serde_json::Value) -> Self {
        Self {
            workflow_id,
            user_id,
            payload,
            produced_at: Utc::now(),
        }
    }
}
