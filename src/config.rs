//! Client configuration management.
//!
//! Settings come from three layers: environment variables (highest
//! precedence), the JSON config file at
//! `~/.config/medinsight/config.json`, and built-in defaults. Only the
//! config file is written back.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/state directory paths
const APP_NAME: &str = "medinsight";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// API base URL when neither the environment nor the config file sets one.
/// The engine's backend listens on 8000 in a default deployment.
const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default storage key names for the persisted token and user record
const DEFAULT_TOKEN_KEY: &str = "medinsight_token";
const DEFAULT_USER_KEY: &str = "medinsight_user";

// Environment variable names
pub const ENV_API_URL: &str = "MEDINSIGHT_API_URL";
pub const ENV_TOKEN_KEY: &str = "MEDINSIGHT_TOKEN_KEY";
pub const ENV_USER_KEY: &str = "MEDINSIGHT_USER_KEY";
pub const ENV_EMAIL: &str = "MEDINSIGHT_EMAIL";
pub const ENV_PASSWORD: &str = "MEDINSIGHT_PASSWORD";
pub const ENV_LOG_FILE: &str = "MEDINSIGHT_LOG_FILE";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_url: Option<String>,
    pub last_email: Option<String>,
    pub token_storage_key: Option<String>,
    pub user_storage_key: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Resolved API base URL: environment, then config file, then default
    pub fn api_base_url(&self) -> String {
        std::env::var(ENV_API_URL)
            .ok()
            .or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    /// Storage key name under which the token is persisted
    pub fn token_storage_key(&self) -> String {
        std::env::var(ENV_TOKEN_KEY)
            .ok()
            .or_else(|| self.token_storage_key.clone())
            .unwrap_or_else(|| DEFAULT_TOKEN_KEY.to_string())
    }

    /// Storage key name under which the user record is persisted
    pub fn user_storage_key(&self) -> String {
        std::env::var(ENV_USER_KEY)
            .ok()
            .or_else(|| self.user_storage_key.clone())
            .unwrap_or_else(|| DEFAULT_USER_KEY.to_string())
    }

    /// Directory holding the persisted session
    pub fn state_dir(&self) -> Result<PathBuf> {
        let state_dir = dirs::state_dir()
            .or_else(dirs::cache_dir)
            .ok_or_else(|| anyhow::anyhow!("Could not find state directory"))?;
        Ok(state_dir.join(APP_NAME))
    }
}
