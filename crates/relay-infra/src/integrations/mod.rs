//! Built-in action and reaction handlers for external services.
//!
//! Every handler performs exactly one HTTP round trip per invocation over a
//! shared `reqwest::Client` and maps the outcome onto [`HandlerError`]:
//!
//! - network failures, timeouts, 429 and 5xx -> `Transient`
//! - 401 and 403 -> `Unauthorized` (the engine re-fetches credentials)
//! - other 4xx and undecodable bodies -> `MalformedState`

pub mod github;
pub mod microsoft;
pub mod spotify;
pub mod weather;

use std::time::Duration;

use relay_core::handler::registry::HandlerRegistryBuilder;
use relay_core::handler::{ActionOutcome, bearer_token};
use relay_types::config::IntegrationsConfig;
use relay_types::credential::ServiceToken;
use relay_types::error::HandlerError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

const USER_AGENT: &str = concat!("relay/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client shared by all integrations.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
}

/// Register every built-in handler.
pub fn register_all(
    builder: &mut HandlerRegistryBuilder,
    config: &IntegrationsConfig,
    client: &reqwest::Client,
) {
    weather::register(builder, &config.weather, client);
    spotify::register(builder, &config.spotify, client);
    github::register(builder, &config.github, client);
    microsoft::register(builder, &config.microsoft, client);
}

// ---------------------------------------------------------------------------
// HTTP plumbing
// ---------------------------------------------------------------------------

/// A JSON REST API authenticated with the user's bearer token for `service`.
#[derive(Clone)]
pub(crate) struct BearerApi {
    client: reqwest::Client,
    base_url: String,
    service: &'static str,
}

impl BearerApi {
    pub(crate) fn new(client: &reqwest::Client, base_url: &str, service: &'static str) -> Self {
        Self {
            client: client.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        credentials: &[ServiceToken],
    ) -> Result<T, HandlerError> {
        let token = bearer_token(credentials, self.service)?;
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .header("accept", "application/json")
            .query(query)
            .send()
            .await
            .map_err(send_error)?;

        read_json(check_status(response).await?).await
    }

    /// POST a JSON body. Returns the response body, if there is one.
    pub(crate) async fn post_json(
        &self,
        path: &str,
        body: &Value,
        credentials: &[ServiceToken],
    ) -> Result<Option<Value>, HandlerError> {
        let token = bearer_token(credentials, self.service)?;
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .header("accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(send_error)?;

        let bytes = check_status(response)
            .await?
            .bytes()
            .await
            .map_err(send_error)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| HandlerError::malformed(format!("unexpected response: {e}")))
    }
}

pub(crate) fn send_error(e: reqwest::Error) -> HandlerError {
    HandlerError::transient(format!("HTTP request failed: {e}"))
}

/// Map a non-success status onto the handler error taxonomy.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, HandlerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("HTTP {status}: {body}");
    Err(match status.as_u16() {
        401 | 403 => HandlerError::Unauthorized(message),
        429 => HandlerError::Transient(message),
        code if code >= 500 => HandlerError::Transient(message),
        _ => HandlerError::MalformedState(message),
    })
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, HandlerError> {
    response
        .json()
        .await
        .map_err(|e| HandlerError::malformed(format!("unexpected response: {e}")))
}

// ---------------------------------------------------------------------------
// Shared option and state helpers
// ---------------------------------------------------------------------------

/// Compare a counter against the value stored under `key` in `state`.
///
/// The first poll (state `Null`) records a baseline without firing. A drop
/// resets the baseline; only growth fires.
pub(crate) fn counter_outcome(
    state: &Value,
    key: &str,
    current: u64,
) -> Result<ActionOutcome, HandlerError> {
    let mut next = serde_json::Map::new();
    next.insert(key.to_string(), Value::from(current));
    let next = Value::Object(next);

    let previous = match state {
        Value::Null => return Ok(ActionOutcome::hold(next)),
        other => other.get(key).and_then(Value::as_u64).ok_or_else(|| {
            HandlerError::malformed(format!("accumulated state has no numeric '{key}'"))
        })?,
    };

    if current > previous {
        Ok(ActionOutcome::fire(next))
    } else {
        Ok(ActionOutcome::hold(next))
    }
}

/// Accept a JSON number or a numeric string.
pub(crate) fn number_or_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<f64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("number out of range")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("'{s}' is not a number"))),
        other => Err(serde::de::Error::custom(format!(
            "expected a number, got {other}"
        ))),
    }
}

/// Accept a JSON boolean or the strings "true" / "false".
pub(crate) fn bool_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(serde::de::Error::custom(format!("'{s}' is not a boolean"))),
        },
        other => Err(serde::de::Error::custom(format!(
            "expected a boolean, got {other}"
        ))),
    }
}
