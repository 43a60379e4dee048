mod config;
pub mod store;

pub use config::{Config, GoogleConfig, SyncConfig};
pub use store::Store;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/calsync[-dev]/`, creating it if needed.
///
/// Set `CALSYNC_ENV=dev` to use the development data directory.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("CALSYNC_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("calsync-dev")
    } else {
        base_dir.join("calsync")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}
