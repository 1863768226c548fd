pub mod models;
pub mod response_encoder;
pub mod stream;

use serde::{Deserialize, Serialize};

pub const CHAT_COMPLETION_OBJECT: &str = "chat.completion";
pub const CHAT_COMPLETION_CHUNK_OBJECT: &str = "chat.completion.chunk";
pub const FINISH_REASON_STOP: &str = "stop";

/// Inbound `OpenAI` Chat Completion request.
///
/// Only the fields the gateway forwards are modeled; sampling parameters and
/// tools are accepted and ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
}

impl ChatCompletionRequest {
    #[must_use]
    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

/// A client message. Both fields are kept raw: `content` so string,
/// part-array and arbitrary values can all be coerced to text, `role` so a
/// malformed role drops one message instead of failing the whole body.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub role: serde_json::Value,
    #[serde(default)]
    pub content: serde_json::Value,
}

/// Non-streaming Chat Completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    pub usage: ChatCompletionUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChoice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: String,
}

/// Final assistant message with the reasoning surfaced separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub role: String,
    pub content: String,
    /// Raw accumulated reasoning; empty when the upstream sent none.
    #[serde(default)]
    pub reasoning_content: String,
}

/// Usage block; always zero, token accounting is not performed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// `GET /v1/models` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelCard>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCard {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub owned_by: String,
}
