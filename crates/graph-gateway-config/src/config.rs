// crates/graph-gateway-config/src/config.rs
// ============================================================================
// Module: Graph Gateway Configuration
// Description: Configuration loading and validation for the gateway.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: graph-gateway-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from an optional TOML file and then overlaid with
//! environment variables, so container deployments can run with environment
//! settings alone. Invalid values fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs::File;
use std::io;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use graph_gateway_core::SigningSecret;
use serde::Deserialize;
use serde::Deserializer;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "graph-gateway.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "GRAPH_GATEWAY_CONFIG";
/// Environment variable for the upstream graph API base URL.
pub const UPSTREAM_URL_ENV: &str = "GRAPH_GATEWAY_UPSTREAM_URL";
/// Environment variable for the runtime posture.
pub const POSTURE_ENV: &str = "GRAPH_GATEWAY_ENV";
/// Environment variable for the shared signing secret.
pub const SIGNING_SECRET_ENV: &str = "GRAPH_GATEWAY_SIGNING_SECRET";
/// Environment variable for the comma-separated internal test credentials.
pub const INTERNAL_TEST_KEYS_ENV: &str = "GRAPH_GATEWAY_INTERNAL_TEST_KEYS";
/// Environment variable for the per-window request budget.
pub const RATE_LIMIT_RPM_ENV: &str = "GRAPH_GATEWAY_RATE_LIMIT_RPM";
/// Environment variable for the rate limit window width.
pub const RATE_LIMIT_WINDOW_ENV: &str = "GRAPH_GATEWAY_RATE_LIMIT_WINDOW_MS";
/// Environment variable selecting the listen port (absent selects stdio).
pub const PORT_ENV: &str = "PORT";
/// Environment variable for the bind host.
pub const BIND_HOST_ENV: &str = "GRAPH_GATEWAY_BIND_HOST";
/// Environment variable for the externally visible base URL.
pub const PUBLIC_URL_ENV: &str = "GRAPH_GATEWAY_PUBLIC_URL";
/// Environment variable for the audit log file.
pub const AUDIT_LOG_ENV: &str = "GRAPH_GATEWAY_AUDIT_LOG";

/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default upstream graph API.
const DEFAULT_UPSTREAM_URL: &str = "https://api.fodda.ai";
/// Default requests allowed per window.
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 60;
/// Default rate limit window in milliseconds.
const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 60_000;
/// Default interval between expired-entry sweeps.
const DEFAULT_RATE_LIMIT_SWEEP_MS: u64 = 5 * 60_000;
/// Default cap on tracked identities.
const DEFAULT_RATE_LIMIT_MAX_ENTRIES: usize = 65_536;
/// Upper bound for requests per window.
const MAX_RATE_LIMIT_REQUESTS: u32 = 100_000;
/// Lower bound for the window width.
const MIN_RATE_LIMIT_WINDOW_MS: u64 = 100;
/// Upper bound for the window width.
const MAX_RATE_LIMIT_WINDOW_MS: u64 = 60 * 60_000;
/// Upper bound for tracked identities.
const MAX_RATE_LIMIT_ENTRIES: usize = 1_048_576;
/// Default bind host for network transports.
const DEFAULT_BIND_HOST: &str = "0.0.0.0";
/// Default maximum request body size.
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Upper bound for request body size.
const MAX_BODY_BYTES_LIMIT: usize = 16 * 1024 * 1024;
/// Default shutdown grace period.
const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 10_000;
/// Upper bound for the shutdown grace period.
const MAX_SHUTDOWN_GRACE_MS: u64 = 5 * 60_000;
/// Default interval between SSE keep-alive comments.
const DEFAULT_KEEP_ALIVE_MS: u64 = 15_000;

// ============================================================================
// SECTION: Gateway Config
// ============================================================================

/// Top-level gateway configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Base URL of the upstream graph API.
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,
    /// Runtime posture controlling placeholders and simulation guardrails.
    #[serde(default)]
    pub posture: RuntimePosture,
    /// Shared secret for request signing.
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub signing_secret: Option<SigningSecret>,
    /// Credentials allowed to use simulation in production.
    #[serde(default)]
    pub internal_test_keys: Vec<String>,
    /// Rate limiter settings.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Transport settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Audit sink settings.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            upstream_url: default_upstream_url(),
            posture: RuntimePosture::default(),
            signing_secret: None,
            internal_test_keys: Vec::new(),
            rate_limit: RateLimitConfig::default(),
            server: ServerConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from disk and the process environment.
    ///
    /// A missing file is only tolerated when no path was requested explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| env::var(key).ok())
    }

    /// Loads configuration using a caller-supplied environment lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load_with(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let (resolved, explicit) = resolve_path(path, &lookup)?;
        let mut config = match read_bounded(&resolved, MAX_CONFIG_FILE_SIZE) {
            Ok(bytes) => Self::parse(&bytes)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound && !explicit => Self::default(),
            Err(err) => return Err(ConfigError::Io(err.to_string())),
        };
        config.apply_env(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses TOML bytes without applying the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the payload is oversized or malformed.
    pub fn parse(bytes: &[u8]) -> Result<Self, ConfigError> {
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Overlays environment variables onto the current values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a numeric variable does not parse.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(url) = lookup(UPSTREAM_URL_ENV) {
            self.upstream_url = url;
        }
        if let Some(posture) = lookup(POSTURE_ENV) {
            self.posture = RuntimePosture::from_label(&posture);
        }
        if let Some(secret) = lookup(SIGNING_SECRET_ENV) {
            self.signing_secret = SigningSecret::new(secret);
        }
        if let Some(keys) = lookup(INTERNAL_TEST_KEYS_ENV) {
            self.internal_test_keys = split_list(&keys);
        }
        if let Some(value) = lookup(RATE_LIMIT_RPM_ENV) {
            self.rate_limit.max_requests = parse_number(RATE_LIMIT_RPM_ENV, &value)?;
        }
        if let Some(value) = lookup(RATE_LIMIT_WINDOW_ENV) {
            self.rate_limit.window_ms = parse_number(RATE_LIMIT_WINDOW_ENV, &value)?;
        }
        if let Some(value) = lookup(PORT_ENV) {
            self.server.port = Some(parse_number(PORT_ENV, &value)?);
        }
        if let Some(host) = lookup(BIND_HOST_ENV) {
            self.server.bind_host = host;
        }
        if let Some(url) = lookup(PUBLIC_URL_ENV) {
            self.server.public_base_url = Some(url);
        }
        if let Some(path) = lookup(AUDIT_LOG_ENV) {
            self.audit.path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.upstream_url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ConfigError::Invalid(
                "upstream_url must include http:// or https://".to_string(),
            ));
        }
        if self.internal_test_keys.iter().any(|key| key.trim().is_empty()) {
            return Err(ConfigError::Invalid("internal_test_keys must not be blank".to_string()));
        }
        self.rate_limit.validate()?;
        self.server.validate()?;
        Ok(())
    }

    /// Returns true when the network transport will run without a signing secret.
    ///
    /// Protected endpoints answer with a server error in this state.
    #[must_use]
    pub const fn missing_secret_for_network(&self) -> bool {
        self.server.port.is_some() && self.signing_secret.is_none()
    }
}

// ============================================================================
// SECTION: Posture
// ============================================================================

/// Deployment posture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimePosture {
    /// Local development: placeholder credentials substitute missing ones.
    Development,
    /// Any non-production deployment without placeholders.
    #[default]
    Standard,
    /// Production: simulation requires an internal credential.
    Production,
}

impl RuntimePosture {
    /// Maps an environment label onto a posture; unrecognized labels are standard.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Self::Development,
            "production" | "prod" => Self::Production,
            _ => Self::Standard,
        }
    }

    /// Returns true when missing credentials may be replaced by placeholders.
    #[must_use]
    pub const fn allows_placeholders(self) -> bool {
        matches!(self, Self::Development)
    }

    /// Returns true for production deployments.
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Stable label for logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Standard => "standard",
            Self::Production => "production",
        }
    }
}

// ============================================================================
// SECTION: Rate Limit
// ============================================================================

/// Fixed-window rate limit configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Maximum requests per identity per window.
    #[serde(default = "default_rate_limit_max_requests")]
    pub max_requests: u32,
    /// Window width in milliseconds.
    #[serde(default = "default_rate_limit_window_ms")]
    pub window_ms: u64,
    /// Interval between sweeps of expired entries.
    #[serde(default = "default_rate_limit_sweep_ms")]
    pub sweep_interval_ms: u64,
    /// Maximum number of tracked identities.
    #[serde(default = "default_rate_limit_max_entries")]
    pub max_entries: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            window_ms: DEFAULT_RATE_LIMIT_WINDOW_MS,
            sweep_interval_ms: DEFAULT_RATE_LIMIT_SWEEP_MS,
            max_entries: DEFAULT_RATE_LIMIT_MAX_ENTRIES,
        }
    }
}

impl RateLimitConfig {
    /// Validates rate limit settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_requests == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit max_requests must be greater than zero".to_string(),
            ));
        }
        if self.max_requests > MAX_RATE_LIMIT_REQUESTS {
            return Err(ConfigError::Invalid("rate_limit max_requests too large".to_string()));
        }
        if self.window_ms < MIN_RATE_LIMIT_WINDOW_MS || self.window_ms > MAX_RATE_LIMIT_WINDOW_MS {
            return Err(ConfigError::Invalid(format!(
                "rate_limit window_ms must be between {MIN_RATE_LIMIT_WINDOW_MS} and \
                 {MAX_RATE_LIMIT_WINDOW_MS}",
            )));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit sweep_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_entries == 0 || self.max_entries > MAX_RATE_LIMIT_ENTRIES {
            return Err(ConfigError::Invalid(format!(
                "rate_limit max_entries must be between 1 and {MAX_RATE_LIMIT_ENTRIES}"
            )));
        }
        Ok(())
    }

    /// Sweep interval as a duration.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Transport configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Listen port; `None` selects the stdio transport.
    #[serde(default)]
    pub port: Option<u16>,
    /// Bind host for network transports.
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    /// Maximum accepted request body size.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Grace period before a forced shutdown.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Route uncorrelated messages to the sole open session.
    #[serde(default = "default_true")]
    pub single_session_fallback: bool,
    /// Use `x-forwarded-for` as the caller origin for rate limiting.
    #[serde(default = "default_true")]
    pub trust_forwarded_for: bool,
    /// Externally visible base URL advertised by discovery.
    #[serde(default)]
    pub public_base_url: Option<String>,
    /// Interval between SSE keep-alive comments.
    #[serde(default = "default_keep_alive_ms")]
    pub keep_alive_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: None,
            bind_host: default_bind_host(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            single_session_fallback: true,
            trust_forwarded_for: true,
            public_base_url: None,
            keep_alive_ms: DEFAULT_KEEP_ALIVE_MS,
        }
    }
}

impl ServerConfig {
    /// Validates transport settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_host.trim().is_empty() {
            return Err(ConfigError::Invalid("server bind_host must be set".to_string()));
        }
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_BODY_BYTES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "server max_body_bytes must be between 1 and {MAX_BODY_BYTES_LIMIT}"
            )));
        }
        if self.shutdown_grace_ms > MAX_SHUTDOWN_GRACE_MS {
            return Err(ConfigError::Invalid("server shutdown_grace_ms too large".to_string()));
        }
        if self.keep_alive_ms == 0 {
            return Err(ConfigError::Invalid(
                "server keep_alive_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(url) = &self.public_base_url
            && !(url.starts_with("https://") || url.starts_with("http://"))
        {
            return Err(ConfigError::Invalid(
                "server public_base_url must include http:// or https://".to_string(),
            ));
        }
        Ok(())
    }

    /// Shutdown grace period as a duration.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Keep-alive interval as a duration.
    #[must_use]
    pub const fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Append-only JSON lines file; stderr when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
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

/// Resolves the config path; the flag reports whether it was requested explicitly.
fn resolve_path(
    path: Option<&Path>,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<(PathBuf, bool), ConfigError> {
    let (resolved, explicit) = if let Some(path) = path {
        (path.to_path_buf(), true)
    } else if let Some(env_path) = lookup(CONFIG_ENV_VAR).filter(|value| !value.is_empty()) {
        (PathBuf::from(env_path), true)
    } else {
        (PathBuf::from(DEFAULT_CONFIG_NAME), false)
    };
    if resolved.to_string_lossy().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    Ok((resolved, explicit))
}

/// Reads at most `max_bytes + 1` bytes; `parse` rejects anything over the limit.
fn read_bounded(path: &Path, max_bytes: usize) -> io::Result<Vec<u8>> {
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX).saturating_add(1);
    let mut bytes = Vec::new();
    File::open(path)?.take(limit).read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Splits a comma-separated list, dropping blanks.
fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty()).map(str::to_string).collect()
}

/// Parses a numeric environment value.
fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid(format!("{key} must be a number")))
}

/// Deserializes an optional secret, treating blank values as absent.
fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SigningSecret>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(SigningSecret::new))
}

/// Default upstream URL.
fn default_upstream_url() -> String {
    DEFAULT_UPSTREAM_URL.to_string()
}

/// Default bind host.
fn default_bind_host() -> String {
    DEFAULT_BIND_HOST.to_string()
}

/// Default request budget.
const fn default_rate_limit_max_requests() -> u32 {
    DEFAULT_RATE_LIMIT_MAX_REQUESTS
}

/// Default window width.
const fn default_rate_limit_window_ms() -> u64 {
    DEFAULT_RATE_LIMIT_WINDOW_MS
}

/// Default sweep interval.
const fn default_rate_limit_sweep_ms() -> u64 {
    DEFAULT_RATE_LIMIT_SWEEP_MS
}

/// Default identity cap.
const fn default_rate_limit_max_entries() -> usize {
    DEFAULT_RATE_LIMIT_MAX_ENTRIES
}

/// Default body limit.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Default grace period.
const fn default_shutdown_grace_ms() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_MS
}

/// Default keep-alive interval.
const fn default_keep_alive_ms() -> u64 {
    DEFAULT_KEEP_ALIVE_MS
}

/// Serde helper for flags that default on.
const fn default_true() -> bool {
    true
}
