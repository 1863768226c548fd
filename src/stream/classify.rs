use serde::Deserialize;

/// Upstream discriminant for intermediate reasoning text.
pub const REASONING_DELTA_TYPE: &str = "reasoning-delta";
/// Upstream discriminant for final-answer text.
pub const TEXT_DELTA_TYPE: &str = "text-delta";

/// A classified upstream delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    ReasoningDelta(String),
    ContentDelta(String),
}

#[derive(Deserialize)]
struct UpstreamPayload {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<String>,
}

/// Classify one `data:` payload.
///
/// Anything that is not a JSON object of a recognized `type` with a
/// non-empty string `delta` yields `None`. Upstream interleaves tool calls,
/// step markers and keep-alive noise, so `None` is a routine outcome.
#[must_use]
pub fn classify_payload(payload: &str) -> Option<UpstreamEvent> {
    if !payload.trim_start().starts_with('{') {
        return None;
    }
    let parsed: UpstreamPayload = serde_json::from_str(payload).ok()?;
    let delta = parsed.delta.filter(|delta| !delta.is_empty())?;
    match parsed.kind.as_str() {
        REASONING_DELTA_TYPE => Some(UpstreamEvent::ReasoningDelta(delta)),
        TEXT_DELTA_TYPE => Some(UpstreamEvent::ContentDelta(delta)),
        _ => None,
    }
}
