//! Credential repository trait definition.

use relay_types::credential::ServiceToken;
use relay_types::error::RepositoryError;
use relay_types::workflow::UserId;

/// Storage for per-user service tokens.
///
/// Token values are never logged by implementations.
pub trait CredentialRepository: Send + Sync {
    /// All tokens a user has stored, one per service.
    fn get_service_tokens(
        &self,
        user_id: &UserId,
    ) -> impl std::future::Future<Output = Result<Vec<ServiceToken>, RepositoryError>> + Send;

    /// Insert or replace the token for `(token.user_id, token.service)`.
    fn save_token(
        &self,
        token: &ServiceToken,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a token. Returns `true` if it existed.
    fn delete_token(
        &self,
        user_id: &UserId,
        service: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
