use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::HeaderMap;

use crate::config::UpstreamConfig;
use crate::error::GatewayError;
use crate::util::random_ipv4;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
const X_CLIENT_IP: HeaderName = HeaderName::from_static("x-client-ip");

/// Client-IP headers that receive a fresh random address on every request.
const SPOOFED_IP_HEADERS: [HeaderName; 3] = [X_FORWARDED_FOR, X_REAL_IP, X_CLIENT_IP];

/// Upstream endpoint and header set, parsed once at startup.
#[derive(Debug, Clone)]
pub struct PreparedUpstream {
    url: url::Url,
    static_headers: HeaderMap,
}

impl PreparedUpstream {
    /// Build the prepared upstream from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the URL or a header does not
    /// parse. Validated configs never hit this.
    pub fn new(upstream: &UpstreamConfig) -> Result<Self, GatewayError> {
        let url = url::Url::parse(&upstream.url)
            .map_err(|err| GatewayError::Internal(format!("Invalid upstream URL: {err}")))?;

        let mut static_headers = HeaderMap::with_capacity(upstream.headers.len() + 1);
        static_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &upstream.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
                GatewayError::Internal(format!("Invalid upstream header name '{name}': {err}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|err| {
                GatewayError::Internal(format!("Invalid upstream header value for '{name}': {err}"))
            })?;
            static_headers.insert(name, value);
        }

        Ok(Self {
            url,
            static_headers,
        })
    }

    #[must_use]
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// Static headers plus one random IPv4 in every client-IP header.
    #[must_use]
    pub fn request_headers(&self) -> HeaderMap {
        let mut headers = self.static_headers.clone();
        let ip = random_ipv4();
        if let Ok(value) = HeaderValue::from_str(&ip) {
            for name in SPOOFED_IP_HEADERS {
                headers.insert(name, value.clone());
            }
        }
        headers
    }
}
