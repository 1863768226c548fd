use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::{IntoResponse, Response};

use crate::api::{health, models, openai_chat};
use crate::error::not_found_response;
use crate::routing::cors::{apply_cors_headers, preflight_response};
use crate::state::AppState;

enum RouteMatch {
    Preflight,
    Health,
    Models,
    ChatCompletions,
    NotFound,
}

/// Dispatch a raw HTTP request to the matching handler.
///
/// Every response, including errors and preflights, carries CORS headers.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    base_path: Arc<str>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let (parts, body) = request.into_parts();
    let route = match_route(&parts.method, parts.uri.path(), base_path.as_ref());

    let mut response = match route {
        RouteMatch::Preflight => preflight_response(),
        RouteMatch::Health => health::health_handler(&state).into_response(),
        RouteMatch::Models => models::handler(&state, &parts.headers),
        RouteMatch::ChatCompletions => openai_chat::handler(state, parts.headers, body).await,
        RouteMatch::NotFound => not_found_response(),
    };

    apply_cors_headers(&mut response);
    Ok(response)
}

#[must_use]
pub fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.trim_end_matches('/').to_string()
    } else {
        format!("/{}", trimmed.trim_end_matches('/'))
    }
}

fn match_route(method: &Method, path: &str, base_path: &str) -> RouteMatch {
    if method == Method::OPTIONS {
        return RouteMatch::Preflight;
    }
    let Some(path) = strip_base_path(path, base_path) else {
        return RouteMatch::NotFound;
    };

    match (method, path) {
        (&Method::GET, "/") => RouteMatch::Health,
        (&Method::GET, "/v1/models") => RouteMatch::Models,
        (&Method::POST, "/v1/chat/completions") => RouteMatch::ChatCompletions,
        _ => RouteMatch::NotFound,
    }
}

fn strip_base_path<'a>(path: &'a str, base_path: &str) -> Option<&'a str> {
    if base_path.is_empty() {
        return Some(path);
    }

    let remainder = path.strip_prefix(base_path)?;
    if remainder.is_empty() {
        Some("/")
    } else if remainder.starts_with('/') {
        Some(remainder)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(method: Method, path: &str, base: &str) -> &'static str {
        match match_route(&method, path, base) {
            RouteMatch::Preflight => "preflight",
            RouteMatch::Health => "health",
            RouteMatch::Models => "models",
            RouteMatch::ChatCompletions => "chat",
            RouteMatch::NotFound => "not_found",
        }
    }

    #[test]
    fn test_match_routes() {
        assert_eq!(route(Method::GET, "/v1/models", ""), "models");
        assert_eq!(route(Method::POST, "/v1/chat/completions", ""), "chat");
        assert_eq!(route(Method::GET, "/", ""), "health");
        assert_eq!(route(Method::OPTIONS, "/anything", ""), "preflight");
    }

    #[test]
    fn test_wrong_method_is_not_found() {
        assert_eq!(route(Method::GET, "/v1/chat/completions", ""), "not_found");
        assert_eq!(route(Method::POST, "/v1/models", ""), "not_found");
        assert_eq!(route(Method::DELETE, "/v1/models", ""), "not_found");
    }

    #[test]
    fn test_base_path() {
        assert_eq!(route(Method::GET, "/proxy/v1/models", "/proxy"), "models");
        assert_eq!(route(Method::GET, "/proxy", "/proxy"), "health");
        assert_eq!(route(Method::GET, "/proxyx/v1/models", "/proxy"), "not_found");
        assert_eq!(route(Method::GET, "/v1/models", "/proxy"), "not_found");
    }

    #[test]
    fn test_normalize_base_path() {
        assert_eq!(normalize_base_path(""), "");
        assert_eq!(normalize_base_path("/"), "");
        assert_eq!(normalize_base_path("proxy/"), "/proxy");
        assert_eq!(normalize_base_path("/proxy/"), "/proxy");
    }
}
