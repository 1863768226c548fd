mod request_id;

use bytes::Bytes;

use crate::auth::{authenticate, build_master_key, MasterKey};
use crate::config::AppConfig;
use crate::error::GatewayError;
use crate::protocol::openai_chat::models::build_model_list;
use crate::transport::{HttpTransport, PreparedUpstream};
use crate::util::unix_now_secs;

use request_id::RequestIdGenerator;

/// Process-wide state shared read-only by every request.
///
/// Nothing here is mutated after construction except the completion id
/// counter, so requests never observe each other.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    master_key: MasterKey,
    models_response_body: Bytes,
    request_ids: RequestIdGenerator,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, transport: HttpTransport) -> Self {
        let master_key = build_master_key(&config);
        let models = build_model_list(
            &config.upstream.models,
            &config.upstream.owned_by,
            unix_now_secs(),
        );
        let models_response_body = serde_json::to_vec(&models)
            .map(Bytes::from)
            .unwrap_or_default();

        Self {
            config,
            transport,
            master_key,
            models_response_body,
            request_ids: RequestIdGenerator::new(),
        }
    }

    /// Build the upstream client from `config` and wrap everything in state.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the upstream endpoint or the
    /// HTTP client cannot be prepared.
    pub fn from_config(config: AppConfig) -> Result<Self, GatewayError> {
        let upstream = PreparedUpstream::new(&config.upstream)?;
        let transport = HttpTransport::new(&config.server, upstream)?;
        Ok(Self::new(config, transport))
    }

    /// Check the request's bearer token against the master key.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Auth`] when the token is missing or wrong.
    pub fn authenticate(&self, headers: &http::HeaderMap) -> Result<(), GatewayError> {
        authenticate(headers, &self.master_key)
    }

    #[must_use]
    pub fn auth_enabled(&self) -> bool {
        !matches!(self.master_key, MasterKey::Disabled)
    }

    /// Pre-serialized `/v1/models` body.
    #[must_use]
    pub fn models_response_body(&self) -> Bytes {
        self.models_response_body.clone()
    }

    #[must_use]
    pub fn next_completion_id(&self) -> String {
        self.request_ids.next_completion_id()
    }
}
