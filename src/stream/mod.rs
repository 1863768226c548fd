pub mod assembler;
pub mod classify;
pub mod lines;
pub mod sse;

pub use assembler::{aggregate_stream, AggregateState, StreamTranslator, TranslationState};
pub use classify::{classify_payload, UpstreamEvent};
pub use lines::LineDecoder;
pub use sse::extract_data_payload;

/// Byte chunks in, classified upstream events out.
///
/// Composes [`LineDecoder`], [`extract_data_payload`] and [`classify_payload`].
/// Lines and payloads that carry no recognized delta are dropped.
#[derive(Debug, Default)]
pub struct EventDecoder {
    lines: LineDecoder,
    scratch: Vec<String>,
}

impl EventDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one upstream chunk, appending the events it completes to `out`.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<UpstreamEvent>) {
        self.lines.feed_into(chunk, &mut self.scratch);
        self.classify_scratch(out);
    }

    /// Flush the trailing fragment at end of stream.
    pub fn finish_into(&mut self, out: &mut Vec<UpstreamEvent>) {
        self.lines.finish_into(&mut self.scratch);
        self.classify_scratch(out);
    }

    fn classify_scratch(&mut self, out: &mut Vec<UpstreamEvent>) {
        for line in self.scratch.drain(..) {
            let Some(payload) = extract_data_payload(&line) else {
                continue;
            };
            match classify_payload(payload) {
                Some(event) => out.push(event),
                None => tracing::trace!(payload, "upstream payload carries no delta"),
            }
        }
    }
}

/// Decode a complete upstream body given as a sequence of chunks.
#[must_use]
pub fn decode_events<'a, I>(chunks: I) -> Vec<UpstreamEvent>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut decoder = EventDecoder::new();
    let mut events = Vec::new();
    for chunk in chunks {
        decoder.feed_into(chunk, &mut events);
    }
    decoder.finish_into(&mut events);
    events
}
