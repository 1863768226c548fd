use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::{json, Value};
use thinkify_rs::config::{
    AppConfig, ClientAuthConfig, FeaturesConfig, ServerConfig, UpstreamConfig,
};
use thinkify_rs::routing::dispatch::dispatch_request;
use thinkify_rs::state::AppState;

const MASTER_KEY: &str = "sk-test";

#[derive(Clone, Default)]
struct Captured {
    hits: Arc<AtomicUsize>,
    last: Arc<Mutex<Option<(HeaderMap, Value)>>>,
}

impl Captured {
    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> (HeaderMap, Value) {
        self.last
            .lock()
            .expect("lock")
            .clone()
            .expect("upstream was called")
    }
}

struct MockUpstream {
    url: String,
    captured: Captured,
    server: tokio::task::JoinHandle<()>,
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Serve `chunks` as separate body frames, optionally stalling before a final
/// frame that never arrives in time.
async fn spawn_upstream(
    status: StatusCode,
    chunks: Vec<Bytes>,
    stall: Option<Duration>,
) -> MockUpstream {
    let captured = Captured::default();
    let handler_captured = captured.clone();
    let app = Router::new().route(
        "/api/chat",
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let captured = handler_captured.clone();
            let chunks = chunks.clone();
            async move {
                captured.hits.fetch_add(1, Ordering::SeqCst);
                *captured.last.lock().expect("lock") = Some((headers, body));

                let frames =
                    futures_util::stream::iter(chunks.into_iter().map(Ok::<Bytes, Infallible>));
                let body = match stall {
                    Some(delay) => Body::from_stream(frames.chain(futures_util::stream::once(
                        async move {
                            tokio::time::sleep(delay).await;
                            Ok::<Bytes, Infallible>(Bytes::from_static(b"data: [DONE]\n\n"))
                        },
                    ))),
                    None => Body::from_stream(frames),
                };
                (
                    status,
                    [(axum::http::header::CONTENT_TYPE, "text/event-stream")],
                    body,
                )
                    .into_response()
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock upstream");
    let addr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockUpstream {
        url: format!("http://{addr}/api/chat"),
        captured,
        server,
    }
}

fn build_config(url: String, master_key: &str, server: ServerConfig) -> AppConfig {
    AppConfig {
        server,
        upstream: UpstreamConfig {
            url,
            headers: BTreeMap::from([
                ("user-agent".to_string(), "thinkify-test/1.0".to_string()),
                ("origin".to_string(), "https://chat.example.com".to_string()),
            ]),
            models: vec!["reasoner-large".to_string(), "reasoner-small".to_string()],
            owned_by: "thinkify".to_string(),
            id_length: 16,
        },
        client_authentication: ClientAuthConfig {
            master_key: master_key.to_string(),
        },
        features: FeaturesConfig::default(),
    }
}

fn build_state(url: String) -> Arc<AppState> {
    Arc::new(
        AppState::from_config(build_config(url, MASTER_KEY, ServerConfig::default()))
            .expect("state"),
    )
}

fn body_frames<const N: usize>(parts: [String; N]) -> Vec<Bytes> {
    parts.into_iter().map(Bytes::from).collect()
}

fn text_delta(text: &str) -> String {
    format!("data: {}\n\n", json!({"type": "text-delta", "id": "t", "delta": text}))
}

fn reasoning_delta(text: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({"type": "reasoning-delta", "id": "r", "delta": text})
    )
}

fn chat_request(body: &Value, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json");
    if let Some(auth) = auth {
        builder = builder.header("authorization", auth);
    }
    builder
        .body(Body::from(serde_json::to_vec(body).expect("serialize")))
        .expect("build request")
}

fn bearer() -> String {
    format!("Bearer {MASTER_KEY}")
}

async fn send(state: &Arc<AppState>, request: Request<Body>) -> Response {
    dispatch_request(Arc::clone(state), Arc::<str>::from(""), request)
        .await
        .expect("dispatch")
}

async fn read_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json body")
}

async fn read_frames(response: Response) -> Vec<String> {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let text = String::from_utf8(body.to_vec()).expect("utf8 body");
    assert!(text.ends_with("\n\n"), "stream ends on a frame boundary");
    text.split_terminator("\n\n")
        .map(|frame| {
            frame
                .strip_prefix("data: ")
                .expect("every frame is a data line")
                .to_string()
        })
        .collect()
}

fn frame_json(frame: &str) -> Value {
    serde_json::from_str(frame).expect("frame json")
}

#[tokio::test]
async fn test_non_stream_with_reasoning() {
    let upstream = spawn_upstream(
        StatusCode::OK,
        body_frames([
            "data: {\"type\":\"start\"}\n\n".to_string(),
            reasoning_delta("Let me"),
            reasoning_delta(" think"),
            text_delta("Hello"),
            text_delta(" world"),
            "data: [DONE]\n\n".to_string(),
        ]),
        None,
    )
    .await;
    let state = build_state(upstream.url.clone());

    let response = send(
        &state,
        chat_request(
            &json!({
                "model": "reasoner-small",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": [{"type": "text", "text": "hi"}]}
                ]
            }),
            Some(&bearer()),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");

    let payload = read_json(response).await;
    assert!(payload["id"].as_str().expect("id").starts_with("chatcmpl-"));
    assert_eq!(payload["object"], "chat.completion");
    assert_eq!(payload["model"], "reasoner-small");
    let message = &payload["choices"][0]["message"];
    assert_eq!(message["role"], "assistant");
    assert_eq!(
        message["content"],
        "<think>\nLet me think\n</think>\n\nHello world"
    );
    assert_eq!(message["reasoning_content"], "Let me think");
    assert_eq!(payload["choices"][0]["finish_reason"], "stop");
    assert_eq!(payload["usage"]["total_tokens"], 0);

    let (headers, body) = upstream.captured.last_request();
    assert_eq!(headers["user-agent"], "thinkify-test/1.0");
    assert_eq!(headers["content-type"], "application/json");
    let ip = headers["x-forwarded-for"].to_str().expect("ip header");
    assert_eq!(ip.split('.').count(), 4);
    assert_eq!(headers["x-real-ip"], ip);
    assert!(headers.get("authorization").is_none());

    assert_eq!(body["model"], "reasoner-small");
    assert_eq!(body["webSearch"], false);
    assert_eq!(body["trigger"], "submit-message");
    assert_eq!(body["id"].as_str().expect("request id").len(), 16);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(
        body["messages"][1]["parts"],
        json!([{"type": "text", "text": "hi"}])
    );
}

#[tokio::test]
async fn test_non_stream_without_reasoning_uses_default_model() {
    let upstream = spawn_upstream(
        StatusCode::OK,
        body_frames([text_delta("  plain\n"), "data: [DONE]\n\n".to_string()]),
        None,
    )
    .await;
    let state = build_state(upstream.url.clone());

    let response = send(
        &state,
        chat_request(
            &json!({"messages": [{"role": "user", "content": "ping"}], "stream": false}),
            Some(&bearer()),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let payload = read_json(response).await;
    assert_eq!(payload["model"], "reasoner-large");
    let message = &payload["choices"][0]["message"];
    assert_eq!(message["content"], "  plain\n");
    assert_eq!(message["reasoning_content"], "");
    assert_eq!(upstream.captured.last_request().1["model"], "reasoner-large");
}

#[tokio::test]
async fn test_stream_three_chunks_then_done() {
    let upstream = spawn_upstream(
        StatusCode::OK,
        body_frames([
            text_delta("A"),
            text_delta("B"),
            text_delta("C"),
            "data: [DONE]\n\n".to_string(),
        ]),
        None,
    )
    .await;
    let state = build_state(upstream.url.clone());

    let response = send(
        &state,
        chat_request(
            &json!({
                "model": "reasoner-large",
                "stream": true,
                "messages": [{"role": "user", "content": "count"}]
            }),
            Some(&bearer()),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    assert_eq!(response.headers()["cache-control"], "no-cache");

    let frames = read_frames(response).await;
    assert_eq!(frames.len(), 5);
    assert_eq!(frames[4], "[DONE]");

    let chunks: Vec<Value> = frames[..4].iter().map(|frame| frame_json(frame)).collect();
    let id = chunks[0]["id"].as_str().expect("id").to_string();
    assert!(id.starts_with("chatcmpl-"));
    for chunk in &chunks {
        assert_eq!(chunk["id"], id.as_str());
        assert_eq!(chunk["object"], "chat.completion.chunk");
        assert_eq!(chunk["created"], chunks[0]["created"]);
        assert_eq!(chunk["model"], "reasoner-large");
    }
    for (chunk, expected) in chunks[..3].iter().zip(["A", "B", "C"]) {
        assert_eq!(chunk["choices"][0]["delta"], json!({"content": expected}));
        assert!(chunk["choices"][0]["finish_reason"].is_null());
    }
    assert_eq!(chunks[3]["choices"][0]["delta"], json!({}));
    assert_eq!(chunks[3]["choices"][0]["finish_reason"], "stop");
}

#[tokio::test]
async fn test_stream_and_non_stream_agree() {
    // Boundaries deliberately split events, a line terminator and a
    // multi-byte character across body frames.
    let whole = format!(
        "{}{}: keep-alive\n\n{}{}data: [DONE]\n\n",
        reasoning_delta("思考中"),
        reasoning_delta("..."),
        text_delta("答案"),
        text_delta(" done")
    );
    let bytes = whole.as_bytes();
    let cut_a = 7;
    let cut_b = whole.find("思").expect("multibyte") + 1;
    let cut_c = whole.find("答").expect("multibyte") + 2;
    let chunks: Vec<Bytes> = [0, cut_a, cut_b, cut_c, bytes.len()]
        .windows(2)
        .map(|w| Bytes::copy_from_slice(&bytes[w[0]..w[1]]))
        .collect();

    let upstream = spawn_upstream(StatusCode::OK, chunks, None).await;
    let state = build_state(upstream.url.clone());
    let body = |stream: bool| {
        json!({"stream": stream, "messages": [{"role": "user", "content": "q"}]})
    };

    let streamed = read_frames(send(&state, chat_request(&body(true), Some(&bearer()))).await).await;
    let mut reasoning = String::new();
    let mut content = String::new();
    for frame in streamed.iter().filter(|frame| *frame != "[DONE]") {
        let delta = &frame_json(frame)["choices"][0]["delta"];
        if let Some(text) = delta["reasoning_content"].as_str() {
            reasoning.push_str(text);
        }
        if let Some(text) = delta["content"].as_str() {
            content.push_str(text);
        }
    }

    let aggregated = read_json(send(&state, chat_request(&body(false), Some(&bearer()))).await).await;
    let message = &aggregated["choices"][0]["message"];
    assert_eq!(reasoning, "思考中...");
    assert_eq!(content, "答案 done");
    assert_eq!(message["reasoning_content"], reasoning.as_str());
    assert_eq!(
        message["content"],
        format!("<think>\n{reasoning}\n</think>\n\n{content}")
    );
    assert_eq!(upstream.captured.hits(), 2);
}

#[tokio::test]
async fn test_models_listing() {
    let state = build_state("http://127.0.0.1:9/api/chat".to_string());
    let request = Request::builder()
        .method("GET")
        .uri("/v1/models")
        .header("authorization", bearer())
        .body(Body::empty())
        .expect("build request");

    let response = send(&state, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["object"], "list");
    let data = payload["data"].as_array().expect("data");
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["id"], "reasoner-large");
    assert_eq!(data[1]["id"], "reasoner-small");
    assert_eq!(data[0]["object"], "model");
    assert_eq!(data[0]["owned_by"], "thinkify");
}

#[tokio::test]
async fn test_unauthorized_never_reaches_upstream() {
    let upstream = spawn_upstream(StatusCode::OK, body_frames([text_delta("x")]), None).await;
    let state = build_state(upstream.url.clone());
    let body = json!({"messages": [{"role": "user", "content": "hi"}]});

    for auth in [
        None,
        Some("Bearer wrong"),
        Some(MASTER_KEY),
        Some("bearer sk-test"),
        Some("Bearer  sk-test"),
    ] {
        let response = send(&state, chat_request(&body, auth)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{auth:?}");
        assert_eq!(
            read_json(response).await,
            json!({"error": {"message": "Unauthorized", "code": 401}})
        );
    }

    let models = Request::builder()
        .method("GET")
        .uri("/v1/models")
        .body(Body::empty())
        .expect("build request");
    assert_eq!(send(&state, models).await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(upstream.captured.hits(), 0);
}

#[tokio::test]
async fn test_auth_disabled_accepts_anonymous_requests() {
    let upstream = spawn_upstream(StatusCode::OK, body_frames([text_delta("open")]), None).await;
    let config = build_config(upstream.url.clone(), "DISABLED", ServerConfig::default());
    let state = Arc::new(AppState::from_config(config).expect("state"));

    let response = send(
        &state,
        chat_request(&json!({"messages": [{"role": "user", "content": "hi"}]}), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        read_json(response).await["choices"][0]["message"]["content"],
        "open"
    );
}

#[tokio::test]
async fn test_upstream_error_status_maps_to_internal_error() {
    let upstream = spawn_upstream(
        StatusCode::INTERNAL_SERVER_ERROR,
        body_frames(["backend exploded".to_string()]),
        None,
    )
    .await;
    let state = build_state(upstream.url.clone());

    for stream in [false, true] {
        let response = send(
            &state,
            chat_request(
                &json!({"stream": stream, "messages": [{"role": "user", "content": "hi"}]}),
                Some(&bearer()),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let payload = read_json(response).await;
        assert_eq!(payload["error"]["type"], "internal_error");
        let message = payload["error"]["message"].as_str().expect("message");
        assert!(message.contains("500"), "{message}");
        assert!(message.contains("backend exploded"), "{message}");
    }
}

#[tokio::test]
async fn test_unreachable_upstream_is_internal_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    let state = build_state(format!("http://{addr}/api/chat"));

    let response = send(
        &state,
        chat_request(
            &json!({"messages": [{"role": "user", "content": "hi"}]}),
            Some(&bearer()),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(read_json(response).await["error"]["type"], "internal_error");
}

#[tokio::test]
async fn test_invalid_requests_are_rejected_before_upstream() {
    let upstream = spawn_upstream(StatusCode::OK, body_frames([text_delta("x")]), None).await;
    let state = build_state(upstream.url.clone());

    let response = send(
        &state,
        chat_request(
            &json!({"messages": [{"content": "no role"}, {"role": "", "content": "blank"}]}),
            Some(&bearer()),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        read_json(response).await,
        json!({"error": {"message": "No valid messages in request", "type": "internal_error"}})
    );

    let malformed = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("authorization", bearer())
        .body(Body::from("{not json"))
        .expect("build request");
    let response = send(&state, malformed).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(read_json(response).await["error"]["type"], "internal_error");

    assert_eq!(upstream.captured.hits(), 0);
}

#[tokio::test]
async fn test_malformed_role_drops_only_that_message() {
    let upstream = spawn_upstream(StatusCode::OK, body_frames([text_delta("ok")]), None).await;
    let state = build_state(upstream.url.clone());

    let response = send(
        &state,
        chat_request(
            &json!({"messages": [
                {"role": 5, "content": "numeric role"},
                {"role": "user", "content": "hi"}
            ]}),
            Some(&bearer()),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["choices"][0]["message"]["content"], "ok");

    let messages = upstream.captured.last_request().1["messages"].clone();
    assert_eq!(messages.as_array().expect("messages").len(), 1);
    assert_eq!(messages[0]["role"], "user");
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let server = ServerConfig {
        body_limit_bytes: 64,
        ..ServerConfig::default()
    };
    let upstream = spawn_upstream(StatusCode::OK, body_frames([text_delta("x")]), None).await;
    let config = build_config(upstream.url.clone(), MASTER_KEY, server);
    let state = Arc::new(AppState::from_config(config).expect("state"));

    let long = "x".repeat(256);
    let response = send(
        &state,
        chat_request(
            &json!({"messages": [{"role": "user", "content": long}]}),
            Some(&bearer()),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(upstream.captured.hits(), 0);
}

#[tokio::test]
async fn test_timeout_mid_stream_emits_error_event() {
    let server = ServerConfig {
        timeout: 1,
        ..ServerConfig::default()
    };
    let upstream = spawn_upstream(
        StatusCode::OK,
        body_frames([text_delta("partial")]),
        Some(Duration::from_secs(5)),
    )
    .await;
    let config = build_config(upstream.url.clone(), MASTER_KEY, server);
    let state = Arc::new(AppState::from_config(config).expect("state"));

    let response = send(
        &state,
        chat_request(
            &json!({"stream": true, "messages": [{"role": "user", "content": "hi"}]}),
            Some(&bearer()),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let frames = tokio::time::timeout(Duration::from_secs(4), read_frames(response))
        .await
        .expect("stream closes after the deadline");
    assert_eq!(frames.len(), 2);
    assert_eq!(
        frame_json(&frames[0])["choices"][0]["delta"]["content"],
        "partial"
    );
    let error = frame_json(&frames[1]);
    assert_eq!(error["error"]["type"], "stream_error");
    assert!(error["error"]["message"].is_string());
    assert!(frames.iter().all(|frame| frame != "[DONE]"));
}

#[tokio::test]
async fn test_timeout_without_stream_is_internal_error() {
    let server = ServerConfig {
        timeout: 1,
        ..ServerConfig::default()
    };
    let upstream = spawn_upstream(
        StatusCode::OK,
        body_frames([text_delta("partial")]),
        Some(Duration::from_secs(5)),
    )
    .await;
    let config = build_config(upstream.url.clone(), MASTER_KEY, server);
    let state = Arc::new(AppState::from_config(config).expect("state"));

    let response = send(
        &state,
        chat_request(
            &json!({"messages": [{"role": "user", "content": "hi"}]}),
            Some(&bearer()),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(read_json(response).await["error"]["type"], "internal_error");
}

#[tokio::test]
async fn test_preflight_and_unknown_routes() {
    let state = build_state("http://127.0.0.1:9/api/chat".to_string());

    let preflight = Request::builder()
        .method("OPTIONS")
        .uri("/v1/chat/completions")
        .body(Body::empty())
        .expect("build request");
    let response = send(&state, preflight).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-allow-methods"], "GET, POST, OPTIONS");
    assert_eq!(
        headers["access-control-allow-headers"],
        "Content-Type, Authorization"
    );

    for (method, uri) in [
        ("GET", "/v1/unknown"),
        ("GET", "/v1/chat/completions"),
        ("POST", "/v1/models"),
    ] {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("build request");
        let response = send(&state, request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method} {uri}");
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(read_json(response).await, json!({"error": "Not Found"}));
    }
}

#[tokio::test]
async fn test_health_reports_config_summary() {
    let state = build_state("http://127.0.0.1:9/api/chat".to_string());
    let request = Request::builder()
        .method("GET")
        .uri("/")
        .body(Body::empty())
        .expect("build request");

    let response = send(&state, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["config"]["models_count"], 2);
    assert_eq!(payload["config"]["auth_enabled"], true);
}
