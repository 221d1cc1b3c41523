//! CLI configuration management.
//!
//! Stores the last email used and a couple of session knobs at
//! `~/.config/authsync/config.json`. Passwords are never written here.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "authsync";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment override for the prefilled email
const EMAIL_ENV_VAR: &str = "AUTHSYNC_EMAIL";

/// Bootstrap timeout when the config file does not set one.
const DEFAULT_BOOTSTRAP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub last_email: Option<String>,
    pub bootstrap_timeout_secs: u64,
    pub auto_confirm_signups: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            last_email: None,
            bootstrap_timeout_secs: DEFAULT_BOOTSTRAP_TIMEOUT_SECS,
            auto_confirm_signups: false,
        }
    }
}

impl CliConfig {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Ok(serde_json::from_str(&contents).context("Failed to parse config file")?)
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

    pub fn log_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("./cache"))
            .join(APP_NAME)
            .join("logs")
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_secs(self.bootstrap_timeout_secs.max(1))
    }

    /// Email to prefill: `AUTHSYNC_EMAIL` wins over the remembered one.
    pub fn default_email(&self) -> Option<String> {
        std::env::var(EMAIL_ENV_VAR)
            .ok()
            .filter(|email| !email.trim().is_empty())
            .or_else(|| self.last_email.clone())
    }
}
