use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflow::UserId;

use std::fmt;

/// A per-user credential for one external service.
///
/// Owned by the credential store. The engine only reads these and hands them
/// to handlers, which pick the token for the service they talk to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceToken {
    pub user_id: UserId,
    /// Service name as used in handler descriptors (e.g. "spotify").
    pub service: String,
    pub token: Redacted,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<Redacted>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceToken {
    pub fn new(user_id: UserId, service: impl Into<String>, token: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            service: service.into(),
            token: Redacted::new(token),
            refresh_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(Redacted::new(refresh_token));
        self
    }
}

/// Find the token for `service` in a user's credential list.
pub fn token_for<'a>(tokens: &'a [ServiceToken], service: &str) -> Option<&'a ServiceToken> {
    tokens.iter().find(|t| t.service == service)
}

/// A wrapper that redacts secret values in Debug and Display output.
///
/// The actual value is accessible via `.expose()`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redacted(String);

impl Redacted {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the underlying secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Show masked representation: last 4 chars visible.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 4 {
            "****".to_string()
        } else {
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("****{tail}")
        }
    }
}

impl fmt::Debug for Redacted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Redacted(\"***\")")
    }
}

impl fmt::Display for Redacted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}
