//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tenancy: TenancyConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// How tenants map onto host names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subdomains {
    /// Apps are served on `<tenant>-<app>.<domain>`, siblings of the tenant host.
    Flat,
    /// Apps are served on `<app>.<tenant>.<domain>`, below the tenant host.
    #[default]
    Nested,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenancyConfig {
    #[serde(default)]
    pub subdomains: Subdomains,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityConfig {
    /// Drops the `Secure` cookie flag and skips share source checks.
    #[serde(default)]
    pub dev_mode: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file, or `:memory:`.
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Session lifetime policy.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    /// Sessions unseen for longer than this are deleted.
    #[serde(default = "default_session_max_age")]
    pub max_age_secs: u64,
    /// `last_seen` is persisted at most once per window.
    #[serde(default = "default_session_refresh_window")]
    pub refresh_window_secs: u64,
    /// Maximum number of sessions fetched when enumerating.
    #[serde(default = "default_session_list_limit")]
    pub list_limit: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_session_max_age(),
            refresh_window_secs: default_session_refresh_window(),
            list_limit: default_session_list_limit(),
        }
    }
}

impl SessionsConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn refresh_window(&self) -> Duration {
        Duration::from_secs(self.refresh_window_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionsConfig {
    /// Delay before the single retry of a lookup on a stale index.
    #[serde(default = "default_index_retry_delay_ms")]
    pub index_retry_delay_ms: u64,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            index_retry_delay_ms: default_index_retry_delay_ms(),
        }
    }
}

impl PermissionsConfig {
    pub fn index_retry_delay(&self) -> Duration {
        Duration::from_millis(self.index_retry_delay_ms)
    }
}
