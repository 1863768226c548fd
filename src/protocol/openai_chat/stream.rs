use crate::stream::sse::openai_sse_frame;
use crate::stream::UpstreamEvent;
use crate::util::{push_json_string_escaped, push_u64_decimal};

use super::{CHAT_COMPLETION_CHUNK_OBJECT, FINISH_REASON_STOP};

/// Encodes `chat.completion.chunk` SSE frames for one response.
///
/// `id`, `model` and `created` are fixed at request start and repeated
/// verbatim on every chunk.
#[derive(Debug, Clone)]
pub struct ChunkEncoder {
    id: String,
    model: String,
    created: u64,
}

impl ChunkEncoder {
    #[must_use]
    pub fn new(id: impl Into<String>, model: impl Into<String>, created: u64) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            created,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Encode a delta chunk carrying exactly one of `content` /
    /// `reasoning_content`. Returns `None` for an event with no text.
    #[must_use]
    pub fn encode_delta(&self, event: &UpstreamEvent) -> Option<String> {
        let (key, text) = match event {
            UpstreamEvent::ReasoningDelta(text) => ("reasoning_content", text.as_str()),
            UpstreamEvent::ContentDelta(text) => ("content", text.as_str()),
        };
        if text.is_empty() {
            return None;
        }
        let mut json = String::with_capacity(160 + self.id.len() + self.model.len() + text.len());
        self.push_chunk_prefix(&mut json);
        json.push_str(",\"choices\":[{\"index\":0,\"delta\":{\"");
        json.push_str(key);
        json.push_str("\":");
        push_json_string_escaped(&mut json, text);
        json.push_str("},\"finish_reason\":null}]}");
        Some(openai_sse_frame(&json))
    }

    /// Encode the terminal chunk: empty delta, `finish_reason: "stop"`.
    #[must_use]
    pub fn encode_finish(&self) -> String {
        let mut json = String::with_capacity(160 + self.id.len() + self.model.len());
        self.push_chunk_prefix(&mut json);
        json.push_str(",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"");
        json.push_str(FINISH_REASON_STOP);
        json.push_str("\"}]}");
        openai_sse_frame(&json)
    }

    fn push_chunk_prefix(&self, out: &mut String) {
        out.push_str("{\"id\":");
        push_json_string_escaped(out, &self.id);
        out.push_str(",\"object\":\"");
        out.push_str(CHAT_COMPLETION_CHUNK_OBJECT);
        out.push_str("\",\"created\":");
        push_u64_decimal(out, self.created);
        out.push_str(",\"model\":");
        push_json_string_escaped(out, &self.model);
    }
}

/// Encode the in-band error event sent when the stream fails after the
/// response headers have gone out.
#[must_use]
pub fn encode_stream_error(message: &str) -> String {
    let mut json = String::with_capacity(48 + message.len());
    json.push_str("{\"error\":{\"message\":");
    push_json_string_escaped(&mut json, message);
    json.push_str(",\"type\":\"stream_error\"}}");
    openai_sse_frame(&json)
}
