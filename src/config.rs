//! Application configuration management.
//!
//! The server base URL is chosen by the driver during initial setup, so
//! unlike most API clients there is no compiled-in endpoint: a missing
//! `server_url` means the app is not configured yet and no backend call
//! may run.
//!
//! Configuration is stored at `~/.config/gasrun/config.json`.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "gasrun";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub server_url: Option<String>,
    pub last_username: Option<String>,
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

    /// Server base URL with any trailing slash removed, if configured.
    pub fn server_url(&self) -> Option<String> {
        self.server_url
            .as_deref()
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
    }

    pub fn is_configured(&self) -> bool {
        self.server_url().is_some()
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_url_trailing_slash() {
        let config = Config {
            server_url: Some("https://gas.example.com/".to_string()),
            last_username: None,
        };
        assert_eq!(config.server_url().as_deref(), Some("https://gas.example.com"));
        assert!(config.is_configured());
    }

    #[test]
    fn test_empty_server_url_is_unconfigured() {
        let config = Config {
            server_url: Some(String::new()),
            last_username: None,
        };
        assert!(!config.is_configured());
        assert!(!Config::default().is_configured());
    }
}
