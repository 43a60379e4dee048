//! TOML-based application configuration.
//!
//! Stored at `~/.config/calsync/config.toml`. OAuth client credentials can
//! be bootstrapped from the `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET`
//! environment variables, which take precedence over the file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::ConfigError;
use crate::oauth::OAuthConfig;

/// Sync window configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How far back events are fetched, in days.
    #[serde(default = "default_past_days")]
    pub window_past_days: i64,
    /// How far ahead events are fetched, in days.
    #[serde(default = "default_future_days")]
    pub window_future_days: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            window_past_days: default_past_days(),
            window_future_days: default_future_days(),
        }
    }
}

/// Google OAuth client credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub google: GoogleConfig,
    /// Database file name inside the data directory.
    #[serde(default = "default_database_file")]
    pub database_file: String,
    /// Fixed localhost port for the OAuth redirect listener.
    #[serde(default = "default_redirect_port")]
    pub oauth_redirect_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            google: GoogleConfig::default(),
            database_file: default_database_file(),
            oauth_redirect_port: default_redirect_port(),
        }
    }
}

fn default_past_days() -> i64 {
    30
}
fn default_future_days() -> i64 {
    90
}
fn default_database_file() -> String {
    "calsync.db".to_string()
}
fn default_redirect_port() -> u16 {
    8085
}

impl Config {
    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load the configuration, writing defaults on first run. Environment
    /// variables override the stored Google client credentials.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        let mut cfg = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::LoadFailed {
                path: path.clone(),
                message: e.to_string(),
            })?;
            toml::from_str(&text).map_err(|e| ConfigError::LoadFailed {
                path: path.clone(),
                message: e.to_string(),
            })?
        } else {
            let cfg = Config::default();
            cfg.save()?;
            cfg
        };

        if let Ok(id) = std::env::var("GOOGLE_CLIENT_ID") {
            cfg.google.client_id = id;
        }
        if let Ok(secret) = std::env::var("GOOGLE_CLIENT_SECRET") {
            cfg.google.client_secret = secret;
        }

        Ok(cfg)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let text = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, text).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })
    }

    /// Absolute path of the SQLite database.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join(&self.database_file))
    }

    /// The Google OAuth endpoint set with this config's client credentials.
    pub fn google_oauth(&self) -> Result<OAuthConfig, ConfigError> {
        if self.google.client_id.is_empty() || self.google.client_secret.is_empty() {
            return Err(ConfigError::MissingOAuthCredentials("google"));
        }
        Ok(OAuthConfig::google(
            &self.google.client_id,
            &self.google.client_secret,
            self.oauth_redirect_port,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_sync_window() {
        let cfg = Config::default();
        assert_eq!(cfg.sync.window_past_days, 30);
        assert_eq!(cfg.sync.window_future_days, 90);
        assert_eq!(cfg.database_file, "calsync.db");
        assert_eq!(cfg.oauth_redirect_port, 8085);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.sync.window_past_days, 30);
        assert!(cfg.google.client_id.is_empty());
    }

    #[test]
    fn google_oauth_requires_credentials() {
        let cfg = Config::default();
        assert!(cfg.google_oauth().is_err());

        let mut cfg = Config::default();
        cfg.google.client_id = "id".into();
        cfg.google.client_secret = "secret".into();
        let oauth = cfg.google_oauth().unwrap();
        assert_eq!(oauth.redirect_uri(), "http://127.0.0.1:8085/callback");
    }
}
