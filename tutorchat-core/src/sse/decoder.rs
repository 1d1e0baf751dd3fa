//! Incremental line framing over a chunked byte stream.
//!
//! Contract:
//! - A line is only emitted once its `\n` has arrived; bytes after the last
//!   newline stay buffered until the next chunk (or the end-of-stream flush).
//! - Splitting is done on raw bytes, so a multi-byte UTF-8 character cut at a
//!   chunk boundary is reassembled before any decoding happens (UTF-8
//!   continuation bytes can never equal `\n`).
//! - A trailing `\r` is trimmed from every emitted line.

/// Stateful byte-to-line decoder carried across network reads.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw chunk as it arrived from the network.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete line, if one is buffered. The `\n` terminator and
    /// an optional preceding `\r` are stripped.
    pub fn next_line(&mut self) -> Option<String> {
        let idx = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=idx).collect();
        line.pop(); // '\n'
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Put a line back at the front of the buffer, newline restored. Used when
    /// a `data:` payload turns out to be cut mid-JSON: the caller re-queues the
    /// raw line and retries once more bytes have arrived.
    pub fn requeue(&mut self, line: &str) {
        let mut restored = Vec::with_capacity(line.len() + 1 + self.buf.len());
        restored.extend_from_slice(line.as_bytes());
        restored.push(b'\n');
        restored.append(&mut self.buf);
        self.buf = restored;
    }

    /// Drain whatever remains after the final chunk as one last line. Only
    /// meaningful at end of stream; returns `None` if the buffer is empty.
    pub fn flush_tail(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let mut line = std::mem::take(&mut self.buf);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
