//! Client configuration
//!
//! Precedence: env vars > config file > defaults. Only the base URL is
//! overridable from the environment (`LECTIO_BASE_URL`); timeouts and retry
//! knobs come from the file or defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

fn default_refresh_path() -> String {
    "/auth/refresh".into()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_refresh_timeout_secs() -> u64 {
    15
}

fn default_network_retry_delay_ms() -> u64 {
    1000
}

/// Configuration for [`crate::ApiClient`].
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Backend origin, e.g. `https://api.lectio.example`.
    pub base_url: String,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    /// Per-request timeout for product API calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Timeout for the refresh call; a timeout counts as a refresh failure.
    #[serde(default = "default_refresh_timeout_secs")]
    pub refresh_timeout_secs: u64,
    /// Fixed backoff before the one-shot transport retry.
    #[serde(default = "default_network_retry_delay_ms")]
    pub network_retry_delay_ms: u64,
    /// Where to persist the session token. In-memory only when unset.
    #[serde(default)]
    pub token_cache_path: Option<PathBuf>,
}

impl ClientConfig {
    /// Config with defaults for everything but the base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            refresh_path: default_refresh_path(),
            request_timeout_secs: default_request_timeout_secs(),
            refresh_timeout_secs: default_refresh_timeout_secs(),
            network_retry_delay_ms: default_network_retry_delay_ms(),
            token_cache_path: None,
        }
    }

    /// Load config from a TOML file, then apply env overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        let mut config: ClientConfig = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))?;
        config.apply_overrides(std::env::var("LECTIO_BASE_URL").ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment-style overrides. Split out so tests can inject
    /// values without mutating process env.
    pub(crate) fn apply_overrides(&mut self, base_url: Option<String>) {
        if let Some(base_url) = base_url {
            self.base_url = base_url;
        }
    }

    /// Reject configs the client cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(Error::Config("base_url must not be empty".into()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "base_url must be an http(s) origin, got: {}",
                self.base_url
            )));
        }
        Ok(())
    }
}
