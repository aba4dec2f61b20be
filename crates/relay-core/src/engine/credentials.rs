use std::sync::Arc;

use relay_types::credential::ServiceToken;
use relay_types::workflow::UserId;

use crate::repository::credential::CredentialRepository;

/// A cycle's copy of the owner's service tokens.
///
/// Resolved once before the cycles start; re-fetched only after a handler
/// reported `Unauthorized`.
pub(crate) struct CycleCredentials<C> {
    repo: Arc<C>,
    tokens: Vec<ServiceToken>,
    stale: bool,
}

impl<C: CredentialRepository> CycleCredentials<C> {
    pub(crate) fn new(repo: Arc<C>, tokens: Vec<ServiceToken>) -> Self {
        Self {
            repo,
            tokens,
            stale: false,
        }
    }

    pub(crate) fn tokens(&self) -> &[ServiceToken] {
        &self.tokens
    }

    pub(crate) fn invalidate(&mut self) {
        self.stale = true;
    }

    /// Re-fetch the tokens if they were invalidated. A failed fetch keeps
    /// the old tokens and retries on the next call.
    pub(crate) async fn refresh_if_stale(&mut self, user_id: &UserId) {
        if !self.stale {
            return;
        }
        match self.repo.get_service_tokens(user_id).await {
            Ok(tokens) => {
                tracing::debug!(count = tokens.len(), "credentials re-fetched");
                self.tokens = tokens;
                self.stale = false;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to re-fetch credentials");
            }
        }
    }
}
