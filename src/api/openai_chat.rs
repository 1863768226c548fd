use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::error::GatewayError;
use crate::observability::{log_request_complete, DeliveryMode, RequestSummary};
use crate::protocol::openai_chat::response_encoder::encode_chat_completion;
use crate::protocol::openai_chat::stream::ChunkEncoder;
use crate::protocol::openai_chat::ChatCompletionRequest;
use crate::protocol::upstream::encoder::encode_upstream_request;
use crate::state::AppState;
use crate::stream::{aggregate_stream, StreamTranslator};
use crate::util::unix_now_secs;

#[inline]
fn ok_json_response(body_bytes: Bytes) -> Response {
    let mut response = Response::new(Body::from(body_bytes));
    *response.status_mut() = http::StatusCode::OK;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}

#[inline]
fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}

async fn read_request_body(body: Body, limit: usize) -> Result<Bytes, GatewayError> {
    axum::body::to_bytes(body, limit)
        .await
        .map_err(|_| GatewayError::PayloadTooLarge { limit })
}

/// `POST /v1/chat/completions`.
///
/// Authentication is checked before the body is even read, so a rejected
/// request never reaches the upstream.
pub async fn handler(state: Arc<AppState>, headers: HeaderMap, body: Body) -> Response {
    if let Err(err) = state.authenticate(&headers) {
        return err.into_response();
    }
    let body = match read_request_body(body, state.config.server.body_limit_bytes).await {
        Ok(body) => body,
        Err(err) => return err.into_response(),
    };

    match handle_chat(&state, &body).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, "chat completion request failed");
            err.into_response()
        }
    }
}

async fn handle_chat(state: &AppState, body: &[u8]) -> Result<Response, GatewayError> {
    let started = Instant::now();
    let request: ChatCompletionRequest = serde_json::from_slice(body)
        .map_err(|err| GatewayError::InvalidRequest(format!("Invalid JSON body: {err}")))?;

    let model = request
        .model
        .as_deref()
        .filter(|model| !model.is_empty())
        .unwrap_or_else(|| state.config.upstream.default_model())
        .to_string();
    let upstream_request =
        encode_upstream_request(&request, &model, state.config.upstream.id_length)?;

    let id = state.next_completion_id();
    let created = unix_now_secs();
    let stream = request.is_stream();
    tracing::info!(
        id = %id,
        model = %model,
        stream,
        messages = upstream_request.messages.len(),
        "chat completion request"
    );

    let upstream = state.transport.send_chat(&upstream_request).await?;

    if stream {
        let translator = StreamTranslator::new(upstream, ChunkEncoder::new(id, model, created))
            .started_at(started);
        return Ok(sse_ok_response(Body::from_stream(
            translator.into_body_stream(),
        )));
    }

    let aggregate = aggregate_stream(upstream).await;
    let mut summary = RequestSummary {
        id: &id,
        model: &model,
        mode: DeliveryMode::Aggregate,
        completed: aggregate.is_ok(),
        reasoning_chars: 0,
        content_chars: 0,
        started,
    };
    let aggregate = match aggregate {
        Ok(aggregate) => aggregate,
        Err(err) => {
            log_request_complete(&summary);
            return Err(err);
        }
    };
    summary.reasoning_chars = aggregate.reasoning_text().chars().count();
    summary.content_chars = aggregate.content_text().chars().count();
    log_request_complete(&summary);

    let response = encode_chat_completion(&id, &model, created, &aggregate);
    let body = serde_json::to_vec(&response)
        .map_err(|err| GatewayError::Internal(format!("Failed to encode response: {err}")))?;
    Ok(ok_json_response(Bytes::from(body)))
}
