pub mod encoder;

use serde::Serialize;

pub const SUBMIT_TRIGGER: &str = "submit-message";

/// Request body accepted by the upstream chat endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamChatRequest {
    pub model: String,
    #[serde(rename = "webSearch")]
    pub web_search: bool,
    pub id: String,
    pub messages: Vec<UpstreamMessage>,
    pub trigger: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamMessage {
    pub role: String,
    pub parts: Vec<UpstreamPart>,
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamPart {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

impl UpstreamPart {
    #[must_use]
    pub fn text(text: String) -> Self {
        Self { kind: "text", text }
    }
}
