//! SQLite credential repository implementation.
//!
//! Implements `CredentialRepository` from `relay-core`. Tokens are stored as
//! given by the OAuth layer; this repository never logs them.

use chrono::Utc;
use relay_core::repository::credential::CredentialRepository;
use relay_types::credential::{Redacted, ServiceToken};
use relay_types::error::RepositoryError;
use relay_types::workflow::UserId;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_error};

/// SQLite-backed implementation of `CredentialRepository`.
pub struct SqliteCredentialRepository {
    pool: DatabasePool,
}

impl SqliteCredentialRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn token_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ServiceToken, RepositoryError> {
    let user_id: String = row.try_get("user_id").map_err(query_error)?;
    let token: String = row.try_get("token").map_err(query_error)?;
    let refresh_token: Option<String> = row.try_get("refresh_token").map_err(query_error)?;
    let created_at: String = row.try_get("created_at").map_err(query_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(query_error)?;

    Ok(ServiceToken {
        user_id: user_id
            .parse()
            .map_err(|e| RepositoryError::Query(format!("invalid user id: {e}")))?,
        service: row.try_get("service").map_err(query_error)?,
        token: Redacted::new(token),
        refresh_token: refresh_token.map(Redacted::new),
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

impl CredentialRepository for SqliteCredentialRepository {
    async fn get_service_tokens(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ServiceToken>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT user_id, service, token, refresh_token, created_at, updated_at
             FROM service_tokens WHERE user_id = ? ORDER BY service ASC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter().map(token_from_row).collect()
    }

    async fn save_token(&self, token: &ServiceToken) -> Result<(), RepositoryError> {
        let now = format_datetime(&Utc::now());

        // Upsert: a user has at most one token per service
        sqlx::query(
            "INSERT INTO service_tokens (user_id, service, token, refresh_token, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id, service) DO UPDATE SET token = excluded.token, refresh_token = excluded.refresh_token, updated_at = excluded.updated_at",
        )
        .bind(token.user_id.to_string())
        .bind(&token.service)
        .bind(token.token.expose())
        .bind(token.refresh_token.as_ref().map(|t| t.expose().to_string()))
        .bind(format_datetime(&token.created_at))
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        tracing::debug!(user_id = %token.user_id, service = %token.service, "service token saved");
        Ok(())
    }

    async fn delete_token(&self, user_id: &UserId, service: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM service_tokens WHERE user_id = ? AND service = ?")
            .bind(user_id.to_string())
            .bind(service)
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }
}
