//! Incremental line framer for the notify byte stream.
//!
//! The transport delivers arbitrarily fragmented or coalesced chunks with no
//! framing beyond newline separators. This framer can be fed any chunking and
//! yields whole trimmed lines; a trailing partial line is buffered until the
//! next chunk completes it. Empty lines are dropped.
use bytes::BytesMut;

/// Upper bound on a single buffered line (a sane cap; the console never emits
/// lines anywhere near this long).
const MAX_LINE_LEN: usize = 4096;

pub struct LineFramer {
    buf: BytesMut,
}

impl LineFramer {
    pub fn new() -> Self {
        Self { buf: BytesMut::with_capacity(256) }
    }

    /// Feed a chunk and collect every line it completes, in arrival order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(line) = self.next_line() {
            lines.push(line);
        }
        // Oversize partial with no terminator in sight: discard to avoid
        // unbounded growth.
        if self.buf.len() > MAX_LINE_LEN {
            self.buf.clear();
        }
        lines
    }

    /// Extract the next complete line, or None if only a partial remains.
    fn next_line(&mut self) -> Option<String> {
        loop {
            let pos = self.buf.iter().position(|&b| b == b'\r' || b == b'\n')?;
            let raw = self.buf.split_to(pos);
            // Consume the terminator byte; a following LF of a CRLF pair shows
            // up as an empty line and is dropped by the trim check below.
            let _ = self.buf.split_to(1);
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                return Some(line);
            }
        }
    }

    /// Bytes currently held as an unterminated partial line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drop any buffered partial (used when a session tears down).
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}
