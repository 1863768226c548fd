//! Incremental byte-chunk to text-line decoder.
//!
//! Chunks may split a line, or a multi-byte UTF-8 sequence, at any byte. The
//! decoder carries the unterminated tail between calls so that feeding a
//! stream chunk by chunk yields exactly the lines of the whole stream.

use memchr::memchr_iter;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Carry-over state for one upstream byte stream.
#[derive(Debug, Default)]
pub struct LineDecoder {
    /// Decoded text not yet terminated by `\n`.
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending_utf8: Vec<u8>,
    /// Set once the stream start has been checked for a byte order mark.
    bom_checked: bool,
}

impl LineDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk` and append every line it completes to `out`.
    ///
    /// Lines are returned without their `\n` terminator or a trailing `\r`.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<String>) {
        if chunk.is_empty() {
            return;
        }
        let scan_from = self.buffer.len();
        self.decode_utf8(chunk);
        self.split_complete_lines(scan_from, out);
    }

    /// Decode `chunk` and return the lines it completes.
    #[must_use]
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Flush state at end of stream.
    ///
    /// An unterminated final fragment is emitted as a last line; a dangling
    /// partial UTF-8 sequence decodes to U+FFFD.
    pub fn finish_into(&mut self, out: &mut Vec<String>) {
        if !self.pending_utf8.is_empty() {
            self.pending_utf8.clear();
            self.buffer.push(char::REPLACEMENT_CHARACTER);
        }
        if self.buffer.is_empty() {
            return;
        }
        let mut line = std::mem::take(&mut self.buffer);
        if line.ends_with('\r') {
            line.pop();
        }
        out.push(line);
    }

    /// Bytes of decoded-but-unterminated text currently buffered.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() + self.pending_utf8.len()
    }

    fn decode_utf8(&mut self, chunk: &[u8]) {
        let joined;
        let mut rest: &[u8] = if self.pending_utf8.is_empty() {
            chunk
        } else {
            let mut bytes = std::mem::take(&mut self.pending_utf8);
            bytes.extend_from_slice(chunk);
            joined = bytes;
            &joined
        };

        if !self.bom_checked {
            if rest.len() < UTF8_BOM.len() && UTF8_BOM.starts_with(rest) {
                self.pending_utf8.extend_from_slice(rest);
                return;
            }
            self.bom_checked = true;
            rest = rest.strip_prefix(UTF8_BOM).unwrap_or(rest);
        }

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    self.buffer
                        .push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(invalid_len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[invalid_len..];
                        }
                        None => {
                            self.pending_utf8.extend_from_slice(after);
                            return;
                        }
                    }
                }
            }
        }
    }

    fn split_complete_lines(&mut self, scan_from: usize, out: &mut Vec<String>) {
        let mut line_start = 0usize;
        for rel_pos in memchr_iter(b'\n', &self.buffer.as_bytes()[scan_from..]) {
            let line_end = scan_from + rel_pos;
            let mut line = &self.buffer[line_start..line_end];
            if let Some(stripped) = line.strip_suffix('\r') {
                line = stripped;
            }
            out.push(line.to_owned());
            line_start = line_end + 1;
        }
        if line_start > 0 {
            self.buffer.drain(..line_start);
        }
    }
}
