//! Global configuration loader for Relay.
//!
//! Reads `config.toml` from the data directory (`~/.relay/` in production)
//! and deserializes it into [`GlobalConfig`]. Falls back to sensible defaults
//! when the file is missing or malformed.

use std::path::Path;

use relay_types::config::GlobalConfig;

/// Shortest accepted poll and rescan interval; a zero interval would spin.
const MIN_POLL_INTERVAL_SECS: u64 = 1;

/// Load global configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`GlobalConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - If the file exists and parses successfully, returns the parsed config.
///
/// The weather API key falls back to the `WEATHER_API_KEY` environment variable.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let mut config = read_config_file(data_dir).await;

    if config.poll_interval_secs < MIN_POLL_INTERVAL_SECS {
        tracing::warn!(
            "poll_interval_secs = {} is too small, using {MIN_POLL_INTERVAL_SECS}",
            config.poll_interval_secs
        );
        config.poll_interval_secs = MIN_POLL_INTERVAL_SECS;
    }
    if config.rescan_interval_secs < MIN_POLL_INTERVAL_SECS {
        tracing::warn!(
            "rescan_interval_secs = {} is too small, using {MIN_POLL_INTERVAL_SECS}",
            config.rescan_interval_secs
        );
        config.rescan_interval_secs = MIN_POLL_INTERVAL_SECS;
    }

    if config.integrations.weather.api_key.is_none() {
        config.integrations.weather.api_key = std::env::var("WEATHER_API_KEY")
            .ok()
            .filter(|key| !key.is_empty());
    }

    config
}

async fn read_config_file(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
    };

    match toml::from_str::<GlobalConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            GlobalConfig::default()
        }
    }
}
