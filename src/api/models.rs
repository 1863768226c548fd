use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

/// List the configured upstream models in `OpenAI` format.
#[must_use]
pub fn handler(state: &Arc<AppState>, headers: &HeaderMap) -> Response {
    if let Err(err) = state.authenticate(headers) {
        return err.into_response();
    }

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/json"),
        )],
        Body::from(state.models_response_body()),
    )
        .into_response()
}
