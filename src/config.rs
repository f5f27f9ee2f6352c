//! Client configuration: auth endpoint, request timeout, poll cadences.
//!
//! Loaded from `~/.qvp/config.yaml` when present; every field has a default so
//! an absent or partial file is fine. The auth endpoint can also be overridden
//! through the `QVP_AUTH_HOST` / `QVP_AUTH_PORT` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Address of the auth service.
    #[serde(default)]
    pub auth: AuthEndpoint,
    /// Connect/response timeout for every remote call, in seconds.
    /// Must stay finite so a hung backend cannot block the client.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Cadence of the stats polling loop, in seconds.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
    /// Cadence of full container-state refreshes, in seconds.
    #[serde(default = "default_state_interval_secs")]
    pub state_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthEndpoint {
    #[serde(default = "default_auth_host")]
    pub host: String,
    #[serde(default = "default_auth_port")]
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            auth: AuthEndpoint::default(),
            request_timeout_secs: default_request_timeout_secs(),
            stats_interval_secs: default_stats_interval_secs(),
            state_interval_secs: default_state_interval_secs(),
        }
    }
}

impl Default for AuthEndpoint {
    fn default() -> Self {
        Self {
            host: default_auth_host(),
            port: default_auth_port(),
        }
    }
}

fn default_auth_host() -> String {
    "localhost".to_string()
}

fn default_auth_port() -> u16 {
    8501
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_stats_interval_secs() -> u64 {
    5
}

fn default_state_interval_secs() -> u64 {
    50
}

impl AppConfig {
    /// Loads the config from `~/.qvp/config.yaml`, falling back to defaults
    /// when the file does not exist, then applies environment overrides.
    pub fn load() -> Result<Self> {
        let path = crate::paths::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads the config from an explicit path; missing file means defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("QVP_AUTH_HOST") {
            if !host.is_empty() {
                self.auth.host = host;
            }
        }
        if let Ok(port) = std::env::var("QVP_AUTH_PORT") {
            match port.parse() {
                Ok(port) => self.auth.port = port,
                Err(_) => tracing::warn!("Ignoring invalid QVP_AUTH_PORT value: {}", port),
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    pub fn state_interval(&self) -> Duration {
        Duration::from_secs(self.state_interval_secs)
    }
}
