use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::config::ServerConfig;
use crate::error::{sanitize_upstream_error, GatewayError};
use crate::protocol::upstream::UpstreamChatRequest;

use super::PreparedUpstream;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn build_reqwest_client(config: &ServerConfig) -> Result<reqwest::Client, GatewayError> {
    let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
    };

    reqwest::Client::builder()
        .pool_max_idle_per_host(config.http_pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        // Total deadline: covers the whole thinking + answering transfer.
        .timeout(Duration::from_secs(config.timeout))
        .no_proxy()
        .build()
        .map_err(|err| GatewayError::Internal(format!("Failed to build HTTP client: {err}")))
}

/// HTTP client for the single upstream chat endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    upstream: PreparedUpstream,
}

impl HttpTransport {
    /// Create a transport with pooling and the whole-exchange timeout from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the client cannot be built.
    pub fn new(config: &ServerConfig, upstream: PreparedUpstream) -> Result<Self, GatewayError> {
        Ok(Self {
            client: build_reqwest_client(config)?,
            upstream,
        })
    }

    #[must_use]
    pub fn upstream(&self) -> &PreparedUpstream {
        &self.upstream
    }

    /// POST a chat request and return the upstream body as a byte stream.
    ///
    /// Exactly one attempt is made.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Upstream`] for non-2xx statuses,
    /// [`GatewayError::Timeout`] when the deadline expires, and
    /// [`GatewayError::Transport`] for connection failures.
    pub async fn send_chat(
        &self,
        request: &UpstreamChatRequest,
    ) -> Result<impl Stream<Item = Result<Bytes, GatewayError>> + Send + 'static, GatewayError>
    {
        let body = serde_json::to_vec(request).map_err(|err| {
            GatewayError::Internal(format!("Failed to serialize upstream request: {err}"))
        })?;

        let response = self
            .client
            .post(self.upstream.url().clone())
            .headers(self.upstream.request_headers())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                "upstream rejected chat request"
            );
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                message: sanitize_upstream_error(&body),
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(GatewayError::from)))
    }
}
