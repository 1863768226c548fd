pub mod validation;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

/// Master key value that turns client authentication off.
pub const AUTH_DISABLED_SENTINEL: &str = "DISABLED";

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Whole-exchange upstream timeout in seconds, covering thinking and answering.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub base_path: String,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    300
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}
fn default_body_limit_bytes() -> usize {
    2 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout: default_timeout(),
            base_path: String::new(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            body_limit_bytes: default_body_limit_bytes(),
            runtime_worker_threads: None,
        }
    }
}

/// The single chat backend every request is forwarded to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub url: String,
    /// Fixed headers sent with every upstream request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub models: Vec<String>,
    #[serde(default = "default_owned_by")]
    pub owned_by: String,
    #[serde(default = "default_id_length")]
    pub id_length: usize,
}

fn default_owned_by() -> String {
    "thinkify".to_string()
}
fn default_id_length() -> usize {
    16
}

impl UpstreamConfig {
    /// Model used when a request does not name one.
    #[must_use]
    pub fn default_model(&self) -> &str {
        self.models.first().map_or("", String::as_str)
    }
}

/// Client authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientAuthConfig {
    pub master_key: String,
}

impl ClientAuthConfig {
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.master_key == AUTH_DISABLED_SENTINEL
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit log lines as JSON objects instead of plain text.
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub client_authentication: ClientAuthConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when parsing fails or
/// [`ConfigError::Validation`] when semantic validation fails.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}
