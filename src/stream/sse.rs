//! SSE `data:` payload extraction and outbound frame encoding.
//!
//! Only the `data: ` field is meaningful on the upstream side; `event:`,
//! `id:`, comments and blank separator lines carry nothing we translate.

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Extract the payload of a `data: ` line.
///
/// Returns `None` for lines without the exact (case-sensitive, single space)
/// prefix, for payloads that are empty after trimming, and for `[DONE]`.
#[inline]
#[must_use]
pub fn extract_data_payload(line: &str) -> Option<&str> {
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();
    if payload.is_empty() || payload == DONE_SENTINEL {
        return None;
    }
    Some(payload)
}

/// Format an OpenAI-style SSE frame (no event type, just data).
#[must_use]
pub fn openai_sse_frame(json: &str) -> String {
    let mut out = String::with_capacity(DATA_PREFIX.len() + json.len() + 2);
    push_openai_sse_frame(&mut out, json);
    out
}

#[inline]
fn push_openai_sse_frame(out: &mut String, json: &str) {
    out.push_str(DATA_PREFIX);
    out.push_str(json);
    out.push_str("\n\n");
}
