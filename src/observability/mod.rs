use std::time::Instant;

use tracing_subscriber::EnvFilter;

/// Map a config log level to a tracing filter directive.
///
/// - "DISABLED" -> `None`, no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
#[must_use]
pub fn tracing_directive(log_level: &str) -> Option<String> {
    let level = log_level.to_uppercase();
    match level.as_str() {
        "DISABLED" => None,
        "WARNING" => Some("WARN".to_string()),
        "CRITICAL" => Some("ERROR".to_string()),
        _ => Some(level),
    }
}

/// Initialize the tracing subscriber with the configured log level.
///
/// `json` switches the formatter to one JSON object per line.
pub fn init_tracing(log_level: &str, json: bool) {
    let Some(directive) = tracing_directive(log_level) else {
        return;
    };

    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("INFO"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// How the response was delivered to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Stream,
    Aggregate,
}

impl DeliveryMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryMode::Stream => "stream",
            DeliveryMode::Aggregate => "aggregate",
        }
    }
}

/// What gets logged when a chat request finishes.
pub struct RequestSummary<'a> {
    pub id: &'a str,
    pub model: &'a str,
    pub mode: DeliveryMode,
    /// `false` when the upstream failed before finishing.
    pub completed: bool,
    pub reasoning_chars: usize,
    pub content_chars: usize,
    pub started: Instant,
}

/// Log a finished chat request, computing duration from its start time.
pub fn log_request_complete(summary: &RequestSummary<'_>) {
    let elapsed_ms = u64::try_from(summary.started.elapsed().as_millis()).unwrap_or(u64::MAX);
    if summary.completed {
        tracing::info!(
            id = summary.id,
            model = summary.model,
            mode = summary.mode.as_str(),
            reasoning_chars = summary.reasoning_chars,
            content_chars = summary.content_chars,
            elapsed_ms,
            "chat completion finished"
        );
    } else {
        tracing::warn!(
            id = summary.id,
            model = summary.model,
            mode = summary.mode.as_str(),
            reasoning_chars = summary.reasoning_chars,
            content_chars = summary.content_chars,
            elapsed_ms,
            "chat completion aborted"
        );
    }
}
