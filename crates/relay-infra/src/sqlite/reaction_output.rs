//! SQLite reaction output repository implementation.

use relay_core::repository::reaction_output::ReactionOutputRepository;
use relay_types::error::RepositoryError;
use relay_types::reaction::ReactionOutput;
use relay_types::workflow::{UserId, WorkflowId};
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_error};

/// SQLite-backed implementation of `ReactionOutputRepository`.
///
/// One row per workflow; rows go away with their workflow.
pub struct SqliteReactionOutputRepository {
    pool: DatabasePool,
}

impl SqliteReactionOutputRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn output_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ReactionOutput, RepositoryError> {
    let workflow_id: String = row.try_get("workflow_id").map_err(query_error)?;
    let user_id: String = row.try_get("user_id").map_err(query_error)?;
    let payload: String = row.try_get("payload").map_err(query_error)?;
    let produced_at: String = row.try_get("produced_at").map_err(query_error)?;

    Ok(ReactionOutput {
        workflow_id: workflow_id
            .parse()
            .map_err(|e| RepositoryError::Query(format!("invalid workflow id: {e}")))?,
        user_id: user_id
            .parse()
            .map_err(|e| RepositoryError::Query(format!("invalid user id: {e}")))?,
        payload: serde_json::from_str(&payload)
            .map_err(|e| RepositoryError::Query(format!("invalid payload JSON: {e}")))?,
        produced_at: parse_datetime(&produced_at)?,
    })
}

impl ReactionOutputRepository for SqliteReactionOutputRepository {
    async fn save_latest(&self, output: &ReactionOutput) -> Result<(), RepositoryError> {
        let payload = serde_json::to_string(&output.payload)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            "INSERT INTO reaction_outputs (workflow_id, user_id, payload, produced_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(workflow_id) DO UPDATE SET payload = excluded.payload, produced_at = excluded.produced_at",
        )
        .bind(output.workflow_id.to_string())
        .bind(output.user_id.to_string())
        .bind(&payload)
        .bind(format_datetime(&output.produced_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn latest(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Option<ReactionOutput>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM reaction_outputs WHERE workflow_id = ?")
            .bind(workflow_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        row.as_ref().map(output_from_row).transpose()
    }

    async fn latest_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ReactionOutput>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM reaction_outputs WHERE user_id = ? ORDER BY produced_at DESC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter().map(output_from_row).collect()
    }
}
