//! Response assembly for both delivery modes.
//!
//! Streaming mode re-emits every classified delta as a `chat.completion.chunk`
//! frame as soon as it is decoded. Non-streaming mode drains the upstream into
//! an [`AggregateState`]. Both consume the same [`EventDecoder`] output, so the
//! concatenated streamed deltas always equal the aggregated text.

use std::convert::Infallible;
use std::fmt::Display;
use std::pin::Pin;
use std::time::Instant;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use smallvec::SmallVec;

use crate::observability::{log_request_complete, DeliveryMode, RequestSummary};
use crate::protocol::openai_chat::stream::{encode_stream_error, ChunkEncoder};

use super::sse::DONE_FRAME;
use super::{EventDecoder, UpstreamEvent};

const THINK_OPEN: &str = "<think>\n";
const THINK_CLOSE: &str = "\n</think>\n\n";

/// Lifecycle of one streamed translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationState {
    /// Awaiting the next upstream chunk.
    Reading,
    /// Upstream ended cleanly; emitting the finish chunk and `[DONE]`.
    Draining,
    /// Upstream failed; emitting the in-band error event.
    Failed,
    /// Outbound stream closed.
    Done,
}

struct PendingFrames {
    frames: SmallVec<[Bytes; 8]>,
    head: usize,
}

impl PendingFrames {
    fn new() -> Self {
        Self {
            frames: SmallVec::new(),
            head: 0,
        }
    }

    #[inline]
    fn push(&mut self, frame: String) {
        self.frames.push(Bytes::from(frame));
    }

    #[inline]
    fn pop_front(&mut self) -> Option<Bytes> {
        if self.head >= self.frames.len() {
            return None;
        }
        let frame = std::mem::take(&mut self.frames[self.head]);
        self.head += 1;
        if self.head == self.frames.len() {
            self.frames.clear();
            self.head = 0;
        }
        Some(frame)
    }
}

/// Pull-driven translator from an upstream byte stream to outbound SSE frames.
///
/// Each call to [`StreamTranslator::next_frame`] awaits at most one upstream
/// read. The outbound side ends exactly once, after either `[DONE]` or the
/// error event.
pub struct StreamTranslator<S> {
    upstream: Pin<Box<S>>,
    decoder: EventDecoder,
    encoder: ChunkEncoder,
    events: Vec<UpstreamEvent>,
    pending: PendingFrames,
    state: TranslationState,
    reasoning_chars: usize,
    content_chars: usize,
    started: Instant,
}

impl<S, E> StreamTranslator<S>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display,
{
    #[must_use]
    pub fn new(upstream: S, encoder: ChunkEncoder) -> Self {
        Self {
            upstream: Box::pin(upstream),
            decoder: EventDecoder::new(),
            encoder,
            events: Vec::with_capacity(8),
            pending: PendingFrames::new(),
            state: TranslationState::Reading,
            reasoning_chars: 0,
            content_chars: 0,
            started: Instant::now(),
        }
    }

    /// Measure elapsed time from `started` instead of construction.
    #[must_use]
    pub fn started_at(mut self, started: Instant) -> Self {
        self.started = started;
        self
    }

    #[must_use]
    pub fn state(&self) -> TranslationState {
        self.state
    }

    /// Next outbound SSE frame, or `None` once the stream is closed.
    pub async fn next_frame(&mut self) -> Option<Bytes> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some(frame);
            }
            match self.state {
                TranslationState::Reading => self.read_upstream().await,
                TranslationState::Draining | TranslationState::Failed => self.close(),
                TranslationState::Done => return None,
            }
        }
    }

    /// Adapt into a body stream suitable for `axum::body::Body::from_stream`.
    pub fn into_body_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send
    where
        E: Send,
    {
        futures_util::stream::unfold(self, |mut translator| async move {
            let frame = translator.next_frame().await?;
            Some((Ok(frame), translator))
        })
    }

    async fn read_upstream(&mut self) {
        match self.upstream.next().await {
            Some(Ok(chunk)) => {
                self.decoder.feed_into(&chunk, &mut self.events);
                self.encode_events();
            }
            Some(Err(err)) => {
                let message = err.to_string();
                tracing::warn!(
                    id = self.encoder.id(),
                    model = self.encoder.model(),
                    error = %message,
                    "upstream stream failed mid-response"
                );
                self.pending.push(encode_stream_error(&message));
                self.state = TranslationState::Failed;
            }
            None => {
                self.decoder.finish_into(&mut self.events);
                self.encode_events();
                self.pending.push(self.encoder.encode_finish());
                self.pending.push(DONE_FRAME.to_owned());
                self.state = TranslationState::Draining;
            }
        }
    }

    fn encode_events(&mut self) {
        for event in self.events.drain(..) {
            let Some(frame) = self.encoder.encode_delta(&event) else {
                continue;
            };
            match &event {
                UpstreamEvent::ReasoningDelta(text) => self.reasoning_chars += text.chars().count(),
                UpstreamEvent::ContentDelta(text) => self.content_chars += text.chars().count(),
            }
            self.pending.push(frame);
        }
    }

    fn close(&mut self) {
        log_request_complete(&RequestSummary {
            id: self.encoder.id(),
            model: self.encoder.model(),
            mode: DeliveryMode::Stream,
            completed: self.state == TranslationState::Draining,
            reasoning_chars: self.reasoning_chars,
            content_chars: self.content_chars,
            started: self.started,
        });
        self.state = TranslationState::Done;
    }
}

/// Accumulated reasoning and answer text for a non-streaming response.
///
/// Both buffers only grow, in upstream arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateState {
    reasoning: String,
    content: String,
}

impl AggregateState {
    pub fn apply(&mut self, event: UpstreamEvent) {
        match event {
            UpstreamEvent::ReasoningDelta(text) => self.reasoning.push_str(&text),
            UpstreamEvent::ContentDelta(text) => self.content.push_str(&text),
        }
    }

    #[must_use]
    pub fn reasoning_text(&self) -> &str {
        &self.reasoning
    }

    #[must_use]
    pub fn content_text(&self) -> &str {
        &self.content
    }

    /// Message content: the answer alone, or the reasoning wrapped in a
    /// `<think>` block followed by the answer.
    #[must_use]
    pub fn final_content(&self) -> String {
        if self.reasoning.is_empty() {
            return self.content.clone();
        }
        let mut out = String::with_capacity(
            THINK_OPEN.len() + self.reasoning.len() + THINK_CLOSE.len() + self.content.len(),
        );
        out.push_str(THINK_OPEN);
        out.push_str(&self.reasoning);
        out.push_str(THINK_CLOSE);
        out.push_str(&self.content);
        out
    }
}

/// Drain an upstream byte stream into an [`AggregateState`].
///
/// # Errors
///
/// Returns the first transport error; partial text is discarded.
pub async fn aggregate_stream<S, E>(upstream: S) -> Result<AggregateState, E>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    let mut upstream = std::pin::pin!(upstream);
    let mut decoder = EventDecoder::new();
    let mut events = Vec::with_capacity(8);
    let mut aggregate = AggregateState::default();

    while let Some(chunk) = upstream.next().await {
        decoder.feed_into(&chunk?, &mut events);
        for event in events.drain(..) {
            aggregate.apply(event);
        }
    }
    decoder.finish_into(&mut events);
    for event in events.drain(..) {
        aggregate.apply(event);
    }
    Ok(aggregate)
}
