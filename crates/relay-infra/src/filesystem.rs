//! Data directory layout.

use std::path::PathBuf;

/// Resolve the Relay data directory.
///
/// Priority: `RELAY_DATA_DIR`, then `~/.relay`, then `./.relay`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("RELAY_DATA_DIR") {
        return PathBuf::from(dir);
    }

    // Use home directory fallback: ~/.relay
    if let Some(home) = dirs::home_dir() {
        return home.join(".relay");
    }

    // Last resort: current directory
    PathBuf::from(".relay")
}

/// Create the data directory if it does not exist yet.
pub async fn ensure_data_dir(data_dir: &std::path::Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(data_dir).await
}
