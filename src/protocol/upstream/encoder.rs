use serde_json::Value;

use crate::error::GatewayError;
use crate::protocol::openai_chat::ChatCompletionRequest;
use crate::util::random_alphanumeric;

use super::{UpstreamChatRequest, UpstreamMessage, UpstreamPart, SUBMIT_TRIGGER};

/// Translate an inbound chat request into the upstream body.
///
/// Messages without a non-empty string role are dropped. Every message and the request itself
/// get a fresh random id of `id_length` characters.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] when no message survives.
pub fn encode_upstream_request(
    request: &ChatCompletionRequest,
    model: &str,
    id_length: usize,
) -> Result<UpstreamChatRequest, GatewayError> {
    let messages: Vec<UpstreamMessage> = request
        .messages
        .iter()
        .filter_map(|message| {
            let role = message.role.as_str().filter(|role| !role.is_empty())?;
            Some(UpstreamMessage {
                role: role.to_string(),
                parts: vec![UpstreamPart::text(coerce_content_to_text(&message.content))],
                id: random_alphanumeric(id_length),
            })
        })
        .collect();

    if messages.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "No valid messages in request".to_string(),
        ));
    }

    Ok(UpstreamChatRequest {
        model: model.to_string(),
        web_search: false,
        id: random_alphanumeric(id_length),
        messages,
        trigger: SUBMIT_TRIGGER,
    })
}

/// Flatten message content to plain text.
///
/// Strings pass through; part arrays keep only `{type:"text", text}` parts
/// joined by `\n`; `null` becomes empty; anything else is its JSON text.
#[must_use]
pub fn coerce_content_to_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| {
                let part = part.as_object()?;
                if part.get("type").and_then(Value::as_str) != Some("text") {
                    return None;
                }
                part.get("text").and_then(Value::as_str)
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
