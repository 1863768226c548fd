use axum::response::{IntoResponse, Response};
use http::StatusCode;

const UPSTREAM_ERROR_MAX_CHARS: usize = 512;

/// Error type shared by the request handlers, transport and translation layers.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Unauthorized")]
    Auth,
    /// Client-input failure; the message is surfaced verbatim.
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Request body too large (max {limit} bytes)")]
    PayloadTooLarge { limit: usize },
    #[error("Upstream returned status {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("Upstream request failed: {0}")]
    Transport(String),
    #[error("Upstream request timed out")]
    Timeout,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

impl GatewayError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Auth => StatusCode::UNAUTHORIZED,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::InvalidRequest(_)
            | GatewayError::Upstream { .. }
            | GatewayError::Transport(_)
            | GatewayError::Timeout
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON envelope returned to the client for this error.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        match self {
            GatewayError::Auth => serde_json::json!({
                "error": { "message": "Unauthorized", "code": 401 }
            }),
            GatewayError::PayloadTooLarge { .. } => serde_json::json!({
                "error": { "message": self.to_string(), "type": "invalid_request_error" }
            }),
            _ => serde_json::json!({
                "error": { "message": self.to_string(), "type": "internal_error" }
            }),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), axum::Json(self.payload())).into_response()
    }
}

/// 404 body for paths and methods no route serves.
#[must_use]
pub fn not_found_response() -> Response {
    (
        StatusCode::NOT_FOUND,
        axum::Json(serde_json::json!({ "error": "Not Found" })),
    )
        .into_response()
}

/// Collapse whitespace and cap the length of an upstream error body so it can
/// be embedded in an error message.
#[must_use]
pub fn sanitize_upstream_error(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let mut out = String::with_capacity(text.len().min(UPSTREAM_ERROR_MAX_CHARS));
    let mut chars = 0usize;
    let mut truncated = false;
    'words: for word in text.split_whitespace() {
        if !out.is_empty() {
            if chars + 1 >= UPSTREAM_ERROR_MAX_CHARS {
                truncated = true;
                break;
            }
            out.push(' ');
            chars += 1;
        }
        for ch in word.chars() {
            if chars >= UPSTREAM_ERROR_MAX_CHARS {
                truncated = true;
                break 'words;
            }
            out.push(ch);
            chars += 1;
        }
    }
    if truncated {
        out.push_str("...");
    }
    if out.is_empty() {
        out.push_str("<empty body>");
    }
    out
}
