//! SQLite workflow repository implementation.
//!
//! Implements `WorkflowRepository` from `relay-core` using sqlx with split
//! read/write pools. Descriptor options and accumulated state are stored as
//! JSON text.

use chrono::Utc;
use relay_core::repository::workflow::WorkflowRepository;
use relay_types::error::RepositoryError;
use relay_types::workflow::{HandlerDescriptor, UserId, Workflow, WorkflowId};
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_error};

/// SQLite-backed implementation of `WorkflowRepository`.
pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn fetch_many(
        &self,
        sql: &str,
        user_id: Option<&UserId>,
    ) -> Result<Vec<Workflow>, RepositoryError> {
        let mut query = sqlx::query(sql);
        if let Some(user_id) = user_id {
            query = query.bind(user_id.to_string());
        }
        let rows = query
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let mut workflows = Vec::with_capacity(rows.len());
        for row in &rows {
            workflows.push(WorkflowRow::from_row(row).map_err(query_error)?.into_workflow()?);
        }
        Ok(workflows)
    }
}

/// A single-row UPDATE that touched nothing means the workflow is gone.
fn ensure_updated(result: sqlx::sqlite::SqliteQueryResult) -> Result<(), RepositoryError> {
    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// Internal row type for mapping SQLite rows to domain Workflow.
struct WorkflowRow {
    id: String,
    user_id: String,
    name: String,
    active: bool,
    action_service: String,
    action_operation: String,
    action_options: String,
    reaction_service: String,
    reaction_operation: String,
    reaction_options: String,
    trigger_flag: bool,
    accumulated_state: String,
    created_at: String,
    updated_at: String,
}

impl WorkflowRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            name: row.try_get("name")?,
            active: row.try_get("active")?,
            action_service: row.try_get("action_service")?,
            action_operation: row.try_get("action_operation")?,
            action_options: row.try_get("action_options")?,
            reaction_service: row.try_get("reaction_service")?,
            reaction_operation: row.try_get("reaction_operation")?,
            reaction_options: row.try_get("reaction_options")?,
            trigger_flag: row.try_get("trigger_flag")?,
            accumulated_state: row.try_get("accumulated_state")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_workflow(self) -> Result<Workflow, RepositoryError> {
        let id = self
            .id
            .parse::<WorkflowId>()
            .map_err(|e| RepositoryError::Query(format!("invalid workflow id: {e}")))?;
        let user_id = self
            .user_id
            .parse::<UserId>()
            .map_err(|e| RepositoryError::Query(format!("invalid user id: {e}")))?;

        Ok(Workflow {
            id,
            user_id,
            name: self.name,
            active: self.active,
            action: HandlerDescriptor::new(
                self.action_service,
                self.action_operation,
                parse_json(&self.action_options, "action options")?,
            ),
            reaction: HandlerDescriptor::new(
                self.reaction_service,
                self.reaction_operation,
                parse_json(&self.reaction_options, "reaction options")?,
            ),
            trigger_flag: self.trigger_flag,
            accumulated_state: parse_json(&self.accumulated_state, "accumulated state")?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn parse_json(s: &str, what: &str) -> Result<serde_json::Value, RepositoryError> {
    serde_json::from_str(s).map_err(|e| RepositoryError::Query(format!("invalid {what} JSON: {e}")))
}

fn to_json(value: &serde_json::Value) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Query(e.to_string()))
}

impl WorkflowRepository for SqliteWorkflowRepository {
    async fn load(&self, id: &WorkflowId) -> Result<Option<Workflow>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let workflow_row = WorkflowRow::from_row(&row).map_err(query_error)?;
                Ok(Some(workflow_row.into_workflow()?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, workflow: &Workflow) -> Result<WorkflowId, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO workflows (id, user_id, name, active, action_service, action_operation, action_options, reaction_service, reaction_operation, reaction_options, trigger_flag, accumulated_state, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(workflow.id.to_string())
        .bind(workflow.user_id.to_string())
        .bind(&workflow.name)
        .bind(workflow.active)
        .bind(&workflow.action.service)
        .bind(&workflow.action.operation)
        .bind(to_json(&workflow.action.options)?)
        .bind(&workflow.reaction.service)
        .bind(&workflow.reaction.operation)
        .bind(to_json(&workflow.reaction.options)?)
        .bind(workflow.trigger_flag)
        .bind(to_json(&workflow.accumulated_state)?)
        .bind(format_datetime(&workflow.created_at))
        .bind(format_datetime(&workflow.updated_at))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(workflow.id),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("UNIQUE") => {
                Err(RepositoryError::Conflict(format!(
                    "workflow '{}' already exists",
                    workflow.name
                )))
            }
            Err(e) => Err(query_error(e)),
        }
    }

    async fn update_trigger_flag(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE workflows SET trigger_flag = ?, updated_at = ? WHERE id = ?")
                .bind(workflow.trigger_flag)
                .bind(format_datetime(&Utc::now()))
                .bind(workflow.id.to_string())
                .execute(&self.pool.writer)
                .await
                .map_err(query_error)?;
        ensure_updated(result)
    }

    async fn update_state(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE workflows SET accumulated_state = ?, updated_at = ? WHERE id = ?")
                .bind(to_json(&workflow.accumulated_state)?)
                .bind(format_datetime(&Utc::now()))
                .bind(workflow.id.to_string())
                .execute(&self.pool.writer)
                .await
                .map_err(query_error)?;
        ensure_updated(result)
    }

    async fn update_state_and_trigger(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE workflows SET accumulated_state = ?, trigger_flag = ?, updated_at = ? WHERE id = ?",
        )
        .bind(to_json(&workflow.accumulated_state)?)
        .bind(workflow.trigger_flag)
        .bind(format_datetime(&Utc::now()))
        .bind(workflow.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;
        ensure_updated(result)
    }

    async fn find_active_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<Workflow>, RepositoryError> {
        self.fetch_many(
            "SELECT * FROM workflows WHERE user_id = ? AND active = 1 ORDER BY created_at ASC",
            Some(user_id),
        )
        .await
    }

    async fn find_all_active(&self) -> Result<Vec<Workflow>, RepositoryError> {
        self.fetch_many(
            "SELECT * FROM workflows WHERE active = 1 ORDER BY created_at ASC",
            None,
        )
        .await
    }

    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<Workflow>, RepositoryError> {
        self.fetch_many(
            "SELECT * FROM workflows WHERE user_id = ? ORDER BY created_at ASC",
            Some(user_id),
        )
        .await
    }

    async fn find_by_name(
        &self,
        user_id: &UserId,
        name: &str,
    ) -> Result<Option<Workflow>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflows WHERE user_id = ? AND name = ?")
            .bind(user_id.to_string())
            .bind(name)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let workflow_row = WorkflowRow::from_row(&row).map_err(query_error)?;
                Ok(Some(workflow_row.into_workflow()?))
            }
            None => Ok(None),
        }
    }

    async fn find_existing(
        &self,
        user_id: &UserId,
        action: &HandlerDescriptor,
        reaction: &HandlerDescriptor,
    ) -> Result<Option<Workflow>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM workflows
             WHERE user_id = ? AND action_service = ? AND action_operation = ?
               AND reaction_service = ? AND reaction_operation = ?",
        )
        .bind(user_id.to_string())
        .bind(&action.service)
        .bind(&action.operation)
        .bind(&reaction.service)
        .bind(&reaction.operation)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        // Options are compared as JSON values, not as stored text.
        for row in &rows {
            let workflow = WorkflowRow::from_row(row).map_err(query_error)?.into_workflow()?;
            if workflow.action.options == action.options
                && workflow.reaction.options == reaction.options
            {
                return Ok(Some(workflow));
            }
        }
        Ok(None)
    }

    async fn set_active(&self, id: &WorkflowId, active: bool) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE workflows SET active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(format_datetime(&Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;
        ensure_updated(result)
    }
}
