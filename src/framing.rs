//! Delimited message framing with a bounded retention window.
//!
//! A peer that never sends a delimiter cannot grow the buffer past the
//! configured limit: the oldest bytes are dropped and the connection stays up.

use bytes::{Buf, Bytes, BytesMut};
use memchr::memmem;

/// Framing parameters, shared read-only by every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramingConfig {
    /// Message terminator; stripped from emitted messages.
    pub delimiter: Bytes,
    /// Maximum retained bytes per message, 0 for unbounded.
    pub limit: usize,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            delimiter: Bytes::from_static(b"\n"),
            limit: 0,
        }
    }
}

/// Splits a byte stream into delimited messages.
#[derive(Debug)]
pub struct MessageFramer {
    finder: memmem::Finder<'static>,
    delimiter_len: usize,
    limit: usize,
    buffer: BytesMut,
    /// Bytes of `buffer` already known not to start a delimiter.
    scanned: usize,
    finished: bool,
}

impl MessageFramer {
    pub fn new(config: &FramingConfig) -> Self {
        let delimiter = if config.delimiter.is_empty() {
            Bytes::from_static(b"\n")
        } else {
            config.delimiter.clone()
        };
        Self {
            finder: memmem::Finder::new(delimiter.as_ref()).into_owned(),
            delimiter_len: delimiter.len(),
            limit: config.limit,
            buffer: BytesMut::new(),
            scanned: 0,
            finished: false,
        }
    }

    /// Append a chunk and iterate over the messages it completes.
    ///
    /// The window is applied once the iterator is exhausted; messages left
    /// unread in a dropped iterator are returned by the next push.
    pub fn push(&mut self, chunk: &[u8]) -> Messages<'_> {
        self.buffer.extend_from_slice(chunk);
        Messages { framer: self }
    }

    /// End of stream: drain unread messages and the undelimited remainder.
    ///
    /// Only the first call yields anything.
    pub fn finish(&mut self) -> Vec<Bytes> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        let mut out: Vec<Bytes> = std::iter::from_fn(|| self.next_message()).collect();
        if !self.buffer.is_empty() {
            let rest = self.buffer.split().freeze();
            self.scanned = 0;
            out.push(self.tail(rest));
        }
        out
    }

    /// Bytes currently held back waiting for a delimiter.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn next_message(&mut self) -> Option<Bytes> {
        loop {
            let pos = self.scanned + self.finder.find(&self.buffer[self.scanned..])?;
            let segment = self.buffer.split_to(pos).freeze();
            self.buffer.advance(self.delimiter_len);
            self.scanned = 0;
            if !segment.is_empty() {
                return Some(self.tail(segment));
            }
        }
    }

    /// Cut the remainder down to the window once no delimiter is left in it.
    fn settle(&mut self) {
        // a delimiter may still straddle the end of the buffer
        let keep_for_delimiter = self.delimiter_len - 1;
        self.scanned = self.buffer.len().saturating_sub(keep_for_delimiter);
        if self.limit == 0 {
            return;
        }
        let keep = self.limit + keep_for_delimiter;
        if self.buffer.len() > keep {
            let excess = self.buffer.len() - keep;
            self.buffer.advance(excess);
            self.scanned = self.scanned.saturating_sub(excess);
            tracing::trace!(dropped = excess, limit = self.limit, "Message window truncated");
        }
    }

    fn tail(&self, message: Bytes) -> Bytes {
        if self.limit > 0 && message.len() > self.limit {
            message.slice(message.len() - self.limit..)
        } else {
            message
        }
    }
}

/// Lazy sequence of complete messages produced by [`MessageFramer::push`].
pub struct Messages<'a> {
    framer: &'a mut MessageFramer,
}

impl Iterator for Messages<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        match self.framer.next_message() {
            Some(message) => Some(message),
            None => {
                self.framer.settle();
                None
            }
        }
    }
}
