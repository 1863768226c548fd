use http::header::AUTHORIZATION;

use crate::config::AppConfig;
use crate::error::GatewayError;

/// Pre-built master key used on the hot path.
pub enum MasterKey {
    Disabled,
    Bearer(Box<str>),
}

/// Build the master key index from config.
#[must_use]
pub fn build_master_key(config: &AppConfig) -> MasterKey {
    if config.client_authentication.is_disabled() {
        MasterKey::Disabled
    } else {
        MasterKey::Bearer(format!("Bearer {}", config.client_authentication.master_key).into())
    }
}

/// Authenticate an incoming request against the configured master key.
///
/// The `Authorization` header must be exactly `Bearer <master_key>`.
///
/// # Errors
///
/// Returns [`GatewayError::Auth`] when the header is missing or does not match.
pub fn authenticate(headers: &http::HeaderMap, master_key: &MasterKey) -> Result<(), GatewayError> {
    match master_key {
        MasterKey::Disabled => Ok(()),
        MasterKey::Bearer(expected) => match headers.get(AUTHORIZATION) {
            Some(value) if value.as_bytes() == expected.as_bytes() => Ok(()),
            _ => Err(GatewayError::Auth),
        },
    }
}
