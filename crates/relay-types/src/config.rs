//! Global configuration types for Relay.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls the
//! engine's poll interval, HTTP client behaviour, and integration endpoints.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the Relay engine.
///
/// Loaded from `~/.relay/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Fixed delay between two action polls of the same workflow.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Timeout applied to every outbound integration request.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// How often `relay serve` rescans the store for workflows to start.
    #[serde(default = "default_rescan_interval_secs")]
    pub rescan_interval_secs: u64,

    /// Per-integration endpoints and keys.
    #[serde(default)]
    pub integrations: IntegrationsConfig,
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_rescan_interval_secs() -> u64 {
    60
}

impl GlobalConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn rescan_interval(&self) -> Duration {
        Duration::from_secs(self.rescan_interval_secs)
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            rescan_interval_secs: default_rescan_interval_secs(),
            integrations: IntegrationsConfig::default(),
        }
    }
}

/// Endpoint configuration for every built-in integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationsConfig {
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default = "ServiceEndpoint::spotify")]
    pub spotify: ServiceEndpoint,
    #[serde(default = "ServiceEndpoint::github")]
    pub github: ServiceEndpoint,
    #[serde(default = "ServiceEndpoint::microsoft")]
    pub microsoft: ServiceEndpoint,
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            weather: WeatherConfig::default(),
            spotify: ServiceEndpoint::spotify(),
            github: ServiceEndpoint::github(),
            microsoft: ServiceEndpoint::microsoft(),
        }
    }
}

/// Weather API settings. The API key may also come from `WEATHER_API_KEY`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "default_weather_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_weather_base_url() -> String {
    "https://api.weatherapi.com/v1".to_string()
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: default_weather_base_url(),
            api_key: None,
        }
    }
}

/// Base URL of a bearer-token REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub base_url: String,
}

impl ServiceEndpoint {
    pub fn spotify() -> Self {
        Self {
            base_url: "https://api.spotify.com/v1".to_string(),
        }
    }

    pub fn github() -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
        }
    }

    pub fn microsoft() -> Self {
        Self {
            base_url: "https://graph.microsoft.com/v1.0".to_string(),
        }
    }
}
