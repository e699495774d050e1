//! Output tokenization.
//!
//! Turns the raw combined output of a program into client events:
//!
//! - A form feed flushes pending text, then emits [`OutboundEvent::Clear`].
//! - Any other character is buffered; the buffer is flushed as
//!   [`OutboundEvent::Output`] when the character is a newline or the buffer
//!   reaches the flush threshold.
//! - End of stream flushes whatever is left.
//!
//! Bytes are decoded incrementally, so a multi-byte character split across
//! two reads is still seen as one character. Invalid UTF-8 becomes U+FFFD.

// ============================================================================
// Imports
// ============================================================================

use std::mem;

use crate::protocol::OutboundEvent;

// ============================================================================
// Constants
// ============================================================================

/// Clear-screen control character.
pub const FORM_FEED: char = '\x0c';

// ============================================================================
// Utf8Decoder
// ============================================================================

/// Incremental UTF-8 decoder that carries incomplete sequences across reads.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decodes as much of `pending + bytes` as possible into `out`.
    fn decode(&mut self, bytes: &[u8], out: &mut String) {
        self.pending.extend_from_slice(bytes);

        let mut start = 0;
        while start < self.pending.len() {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(text) => {
                    out.push_str(text);
                    start = self.pending.len();
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(
                        &self.pending[start..start + valid],
                    ));
                    start += valid;

                    match e.error_len() {
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start += invalid;
                        }
                        // Incomplete sequence at the end; wait for more bytes.
                        None => break,
                    }
                }
            }
        }

        self.pending.drain(..start);
    }

    /// Flushes a trailing incomplete sequence as U+FFFD.
    fn finish(&mut self, out: &mut String) {
        if !self.pending.is_empty() {
            self.pending.clear();
            out.push(char::REPLACEMENT_CHARACTER);
        }
    }
}

// ============================================================================
// OutputTokenizer
// ============================================================================

/// Splits a program's output stream into [`OutboundEvent`]s.
#[derive(Debug)]
pub struct OutputTokenizer {
    /// Text accumulated since the last flush.
    buffer: String,
    /// Buffer size (bytes) that forces a flush.
    threshold: usize,
    /// Carries partial characters between reads.
    decoder: Utf8Decoder,
    /// Scratch space for decoded text.
    scratch: String,
}

impl OutputTokenizer {
    /// Creates a tokenizer with the given flush threshold.
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            buffer: String::with_capacity(threshold + 4),
            threshold,
            decoder: Utf8Decoder::default(),
            scratch: String::new(),
        }
    }

    /// Feeds raw bytes and returns the events they complete.
    #[must_use]
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<OutboundEvent> {
        let mut scratch = mem::take(&mut self.scratch);
        self.decoder.decode(bytes, &mut scratch);

        let mut events = Vec::new();
        for c in scratch.chars() {
            self.push_char(c, &mut events);
        }

        scratch.clear();
        self.scratch = scratch;
        events
    }

    /// Ends the stream and returns the final events.
    #[must_use]
    pub fn finish(&mut self) -> Vec<OutboundEvent> {
        let mut tail = String::new();
        self.decoder.finish(&mut tail);

        let mut events = Vec::new();
        for c in tail.chars() {
            self.push_char(c, &mut events);
        }
        self.flush(&mut events);
        events
    }

    /// Returns the number of buffered bytes.
    #[inline]
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Applies the tokenization rules to one character.
    fn push_char(&mut self, c: char, events: &mut Vec<OutboundEvent>) {
        if c == FORM_FEED {
            self.flush(events);
            events.push(OutboundEvent::Clear);
            return;
        }

        self.buffer.push(c);
        if c == '\n' || self.buffer.len() >= self.threshold {
            self.flush(events);
        }
    }

    /// Emits the buffer as output if it is non-empty.
    fn flush(&mut self, events: &mut Vec<OutboundEvent>) {
        if !self.buffer.is_empty() {
            let data = mem::replace(&mut self.buffer, String::with_capacity(self.threshold + 4));
            events.push(OutboundEvent::Output { data });
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
