//! Server-Sent Events (SSE) line framing.
//!
//! Both the MCP client and the completion driver treat every `data:` line as
//! one self-contained JSON payload, so framing here is line-oriented rather
//! than event-oriented. Lines can span multiple TCP packets, so bytes are
//! buffered until a full line is available.

use std::fmt;

/// Field prefix carrying a payload.
pub const DATA_PREFIX: &str = "data:";

/// Stream terminator payload.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Extract the payload of a `data:` line.
///
/// Returns `None` for other fields, comments, blank lines and the
/// terminator sentinel.
pub fn data_payload(line: &str) -> Option<&str> {
    let line = line.trim_end_matches('\r');
    let value = line.strip_prefix(DATA_PREFIX)?;
    let value = value.strip_prefix(' ').unwrap_or(value).trim();
    if value.is_empty() || value == DONE_SENTINEL {
        return None;
    }
    Some(value)
}

/// Whether a complete body is SSE-framed rather than plain JSON.
///
/// A `data:` field must start a line; JSON escapes newlines inside strings,
/// so a JSON body mentioning "data:" in a value is not misclassified.
pub fn is_sse_body(body: &str) -> bool {
    let head = body.trim_start();
    head.starts_with(DATA_PREFIX)
        || head.starts_with("event:")
        || head.starts_with(':')
        || body.contains("\ndata:")
}

/// All payloads of a complete SSE body, in order.
pub fn data_payloads(body: &str) -> Vec<&str> {
    body.lines().filter_map(data_payload).collect()
}

/// Incremental line buffer for streamed SSE bodies.
#[derive(Default)]
pub struct SseLineBuffer {
    /// Bytes of the incomplete trailing line
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    /// Create a new line buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return the payloads of every completed `data:` line.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            if let Some(payload) = data_payload(&line) {
                payloads.push(payload.to_string());
            }
        }
        payloads
    }

    /// Flush a trailing line that was never newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        data_payload(&line).map(str::to_string)
    }

    /// Check if there's any buffered data.
    pub fn has_buffered_data(&self) -> bool {
        !self.buffer.is_empty()
    }
}

impl fmt::Debug for SseLineBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseLineBuffer")
            .field("buffer_len", &self.buffer.len())
            .finish()
    }
}
