//! Configuration management for gpu-bridge.
//!
//! Configuration is loaded from `~/.config/gpu-bridge/config.toml`, then
//! overridden by environment variables and command-line flags.

use crate::client::{MIN_POLL_INTERVAL, MIN_REQUEST_TIMEOUT};
use crate::error::RelayError;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder written into a fresh config file for the API key.
pub const API_KEY_PLACEHOLDER: &str = "YOUR_API_KEY_HERE";

/// Placeholder written into a fresh config file for the endpoint id.
pub const ENDPOINT_ID_PLACEHOLDER: &str = "YOUR_ENDPOINT_ID_HERE";

/// Longest wait `send` accepts, in seconds (one day).
pub const MAX_WAIT_SECS: u64 = 24 * 60 * 60;

/// Base URL of the serverless API.
pub const DEFAULT_API_URL: &str = "https://api.runpod.ai/v2";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Which endpoint to talk to, and how.
    #[serde(default)]
    pub endpoint: EndpointConfig,
    /// Poll loop tuning.
    #[serde(default)]
    pub polling: PollingConfig,
}

/// Endpoint and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// API key (prefer RUNPOD_API_KEY env var).
    #[serde(default = "default_api_key")]
    pub api_key: String,
    /// Serverless endpoint id (or RUNPOD_ENDPOINT_ID).
    #[serde(default = "default_endpoint_id")]
    pub endpoint_id: String,
    /// API base URL (default: https://api.runpod.ai/v2).
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            api_key: default_api_key(),
            endpoint_id: default_endpoint_id(),
            api_url: default_api_url(),
        }
    }
}

fn default_api_key() -> String {
    API_KEY_PLACEHOLDER.to_string()
}

fn default_endpoint_id() -> String {
    ENDPOINT_ID_PLACEHOLDER.to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

/// Poll loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between status queries, in milliseconds (default: 2000).
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// How long `send` waits for a terminal status (default: 60).
    #[serde(default = "default_wait_secs")]
    pub default_wait_secs: u64,
    /// Upper bound for a single HTTP request (default: 30).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            default_wait_secs: default_wait_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_interval_ms() -> u64 {
    2000
}

fn default_wait_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Reject values that would hammer the API or never finish.
    pub fn validate(&self) -> Result<()> {
        if self.interval() < MIN_POLL_INTERVAL {
            bail!(
                "polling.interval_ms must be at least {}",
                MIN_POLL_INTERVAL.as_millis()
            );
        }
        if self.request_timeout() < MIN_REQUEST_TIMEOUT {
            bail!(
                "polling.request_timeout_secs must be at least {}",
                MIN_REQUEST_TIMEOUT.as_secs()
            );
        }
        if self.default_wait_secs > MAX_WAIT_SECS {
            bail!("polling.default_wait_secs must be at most {MAX_WAIT_SECS}");
        }
        Ok(())
    }
}

/// Values from the command line or environment that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_key: Option<String>,
    pub endpoint_id: Option<String>,
    pub api_url: Option<String>,
}

impl Config {
    /// Get the config directory path.
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("gpu-bridge"))
            .context("Could not determine config directory")
    }

    /// Get the default config file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from `path`, using defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Self = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config
                .polling
                .validate()
                .with_context(|| format!("Invalid config file: {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply command-line and environment overrides. Empty strings are ignored.
    pub fn apply(&mut self, overrides: Overrides) {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        if let Some(key) = non_empty(overrides.api_key) {
            self.endpoint.api_key = key;
        }
        if let Some(id) = non_empty(overrides.endpoint_id) {
            self.endpoint.endpoint_id = id;
        }
        if let Some(url) = non_empty(overrides.api_url) {
            self.endpoint.api_url = url;
        }
    }

    /// Credentials for the configured endpoint.
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.endpoint.api_key, &self.endpoint.endpoint_id)
    }
}

/// API key and endpoint id. Both opaque to this client.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub endpoint_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.masked_key())
            .field("endpoint_id", &self.endpoint_id)
            .finish()
    }
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, endpoint_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint_id: endpoint_id.into(),
        }
    }

    /// Whether the API key is set to something other than the placeholder.
    pub fn has_api_key(&self) -> bool {
        let key = self.api_key.trim();
        !key.is_empty() && key != API_KEY_PLACEHOLDER
    }

    /// Whether the endpoint id is set to something other than the placeholder.
    pub fn has_endpoint_id(&self) -> bool {
        let endpoint = self.endpoint_id.trim();
        !endpoint.is_empty() && endpoint != ENDPOINT_ID_PLACEHOLDER
    }

    /// Check that both values are set and no longer placeholders.
    pub fn validate(&self) -> Result<(), RelayError> {
        if !self.has_api_key() {
            return Err(RelayError::Configuration(
                "the API key is not set".to_string(),
            ));
        }
        if !self.has_endpoint_id() {
            return Err(RelayError::Configuration(
                "the endpoint id is not set".to_string(),
            ));
        }

        let endpoint = self.endpoint_id.trim();

        if endpoint.contains('/') {
            return Err(RelayError::Configuration(format!(
                "the endpoint id '{endpoint}' must not contain '/'"
            )));
        }

        Ok(())
    }

    /// The API key with everything but the last four characters masked.
    pub fn masked_key(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.len() >= 4 {
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{}{}", "*".repeat(chars.len() - 4), tail)
        } else {
            "*".repeat(chars.len())
        }
    }
}
