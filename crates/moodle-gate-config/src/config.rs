// crates/moodle-gate-config/src/config.rs
// ============================================================================
// Module: Moodle Gate Configuration
// Description: Configuration loading and validation for the gateway.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, toml, url
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and value
//! limits. Missing or invalid configuration fails closed: the gateway
//! refuses to start rather than running with a guessed panel endpoint or a
//! permissive timeout. Every section has defaults so a minimal file only
//! needs the panel endpoint.
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "moodle-gate.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "MOODLE_GATE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default bind address for the HTTP transport.
const DEFAULT_BIND: &str = "127.0.0.1:3000";
/// Default maximum inbound request body size in bytes.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Minimum allowed inbound body limit.
pub(crate) const MIN_MAX_BODY_BYTES: usize = 1024;
/// Maximum allowed inbound body limit.
pub(crate) const MAX_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
/// Default session idle TTL in milliseconds (30 minutes).
pub const DEFAULT_SESSION_TTL_MS: u64 = 30 * 60 * 1000;
/// Default sweep interval in milliseconds (5 minutes).
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 5 * 60 * 1000;
/// Default remote call timeout in milliseconds.
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 30_000;
/// Minimum allowed remote call timeout in milliseconds.
pub(crate) const MIN_REMOTE_TIMEOUT_MS: u64 = 100;
/// Maximum allowed remote call timeout in milliseconds.
pub(crate) const MAX_REMOTE_TIMEOUT_MS: u64 = 300_000;
/// Minimum allowed session TTL in milliseconds.
pub(crate) const MIN_SESSION_TTL_MS: u64 = 1_000;
/// Minimum allowed sweep interval in milliseconds.
pub(crate) const MIN_SWEEP_INTERVAL_MS: u64 = 1_000;
/// Default panel resolution timeout in milliseconds.
pub const DEFAULT_PANEL_TIMEOUT_MS: u64 = 10_000;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Moodle Gate configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Inbound HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Control-plane (panel) resolution configuration.
    pub panel: PanelConfig,
    /// Outbound Moodle client configuration.
    #[serde(default)]
    pub moodle: MoodleClientConfig,
    /// Session lifecycle configuration.
    #[serde(default)]
    pub sessions: SessionConfig,
}

impl GatewayConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.panel.validate()?;
        self.moodle.validate()?;
        self.sessions.validate()?;
        Ok(())
    }
}

/// Inbound HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP transport.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum inbound request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    /// Validates the bind address and body limit.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::Invalid(format!("server.bind is not an address: {}", self.bind)))?;
        if self.max_body_bytes < MIN_MAX_BODY_BYTES || self.max_body_bytes > MAX_MAX_BODY_BYTES {
            return Err(ConfigError::Invalid("server.max_body_bytes out of range".to_string()));
        }
        Ok(())
    }

    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::Invalid(format!("server.bind is not an address: {}", self.bind)))
    }
}

/// Control-plane resolution configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PanelConfig {
    /// Panel resolution endpoint receiving the credential exchange POST.
    pub endpoint: String,
    /// Resolution request timeout in milliseconds.
    #[serde(default = "default_panel_timeout_ms")]
    pub timeout_ms: u64,
    /// Allow plain-HTTP panel endpoints (explicit opt-in for local setups).
    #[serde(default)]
    pub allow_http: bool,
}

impl PanelConfig {
    /// Validates the panel endpoint and timeout.
    fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.endpoint)
            .map_err(|err| ConfigError::Invalid(format!("panel.endpoint is not a URL: {err}")))?;
        match url.scheme() {
            "https" => {}
            "http" if self.allow_http => {}
            "http" => {
                return Err(ConfigError::Invalid(
                    "panel.endpoint uses http:// without allow_http".to_string(),
                ));
            }
            other => {
                return Err(ConfigError::Invalid(format!(
                    "panel.endpoint scheme must be http(s), got {other}"
                )));
            }
        }
        if self.timeout_ms < MIN_REMOTE_TIMEOUT_MS || self.timeout_ms > MAX_REMOTE_TIMEOUT_MS {
            return Err(ConfigError::Invalid("panel.timeout_ms out of range".to_string()));
        }
        Ok(())
    }
}

/// Outbound Moodle client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MoodleClientConfig {
    /// Default remote call timeout in milliseconds.
    #[serde(default = "default_remote_timeout_ms")]
    pub timeout_ms: u64,
    /// Allow plain-HTTP Moodle base URLs (explicit opt-in for local setups).
    #[serde(default)]
    pub allow_http: bool,
    /// User agent sent with remote calls.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for MoodleClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_remote_timeout_ms(),
            allow_http: false,
            user_agent: default_user_agent(),
        }
    }
}

impl MoodleClientConfig {
    /// Validates client limits.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms < MIN_REMOTE_TIMEOUT_MS || self.timeout_ms > MAX_REMOTE_TIMEOUT_MS {
            return Err(ConfigError::Invalid("moodle.timeout_ms out of range".to_string()));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid("moodle.user_agent must be non-empty".to_string()));
        }
        Ok(())
    }
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Idle TTL in milliseconds before a session is evicted.
    #[serde(default = "default_session_ttl_ms")]
    pub ttl_ms: u64,
    /// Interval between eviction sweeps in milliseconds.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_session_ttl_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl SessionConfig {
    /// Validates session lifecycle limits.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_ms < MIN_SESSION_TTL_MS {
            return Err(ConfigError::Invalid("sessions.ttl_ms below minimum".to_string()));
        }
        if self.sweep_interval_ms < MIN_SWEEP_INTERVAL_MS {
            return Err(ConfigError::Invalid(
                "sessions.sweep_interval_ms below minimum".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Default bind address.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Default inbound body limit.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Default panel resolution timeout.
const fn default_panel_timeout_ms() -> u64 {
    DEFAULT_PANEL_TIMEOUT_MS
}

/// Default remote call timeout.
const fn default_remote_timeout_ms() -> u64 {
    DEFAULT_REMOTE_TIMEOUT_MS
}

/// Default user agent string.
fn default_user_agent() -> String {
    concat!("moodle-gate/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Default session TTL.
const fn default_session_ttl_ms() -> u64 {
    DEFAULT_SESSION_TTL_MS
}

/// Default sweep interval.
const fn default_sweep_interval_ms() -> u64 {
    DEFAULT_SWEEP_INTERVAL_MS
}

// ============================================================================
// SECTION: Tests
// ============================================================================
