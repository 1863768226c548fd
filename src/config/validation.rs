use std::collections::HashSet;

use http::header::{HeaderName, HeaderValue};

use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_master_key(config)?;
    validate_upstream(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if server.body_limit_bytes == 0 {
        return Err(validation_err(
            "server.body_limit_bytes must be greater than 0",
        ));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_master_key(config: &AppConfig) -> Result<(), ConfigError> {
    let key = &config.client_authentication.master_key;
    if key.trim().is_empty() {
        return Err(validation_err(
            "client_authentication.master_key cannot be empty",
        ));
    }
    if HeaderValue::from_str(&format!("Bearer {key}")).is_err() {
        return Err(validation_err(
            "client_authentication.master_key must be a valid header value",
        ));
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    let parsed = url::Url::parse(&upstream.url)
        .map_err(|err| validation_err(format!("upstream.url is not a valid URL: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(
            "upstream.url must use http:// or https://",
        ));
    }
    if upstream.id_length == 0 {
        return Err(validation_err("upstream.id_length must be greater than 0"));
    }

    if upstream.models.is_empty() {
        return Err(validation_err("upstream.models cannot be empty"));
    }
    let mut seen = HashSet::new();
    for model in &upstream.models {
        if model.trim().is_empty() {
            return Err(validation_err("upstream.models contains an empty model id"));
        }
        if !seen.insert(model.as_str()) {
            return Err(validation_err(format!(
                "upstream.models has a duplicate entry '{model}'"
            )));
        }
    }

    for (name, value) in &upstream.headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            return Err(validation_err(format!(
                "upstream.headers: '{name}' is not a valid header name"
            )));
        }
        if HeaderValue::from_str(value).is_err() {
            return Err(validation_err(format!(
                "upstream.headers: value for '{name}' is not a valid header value"
            )));
        }
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}
