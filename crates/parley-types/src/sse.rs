//! Server-Sent Events (SSE) parser.
//!
//! Parses raw bytes from an HTTP response into SSE events. Works on bytes so
//! that a read boundary falling inside a multi-byte UTF-8 character is
//! harmless: text is only decoded once a whole event block is buffered.

/// A single SSE event parsed from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
}

/// Incremental SSE parser that processes bytes into events.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already searched for a blank line.
    scanned: usize,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and return any complete events.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        // Only the new bytes, plus one for a `\r` left pending, need work
        let start = self.buffer.len().saturating_sub(1);
        self.buffer.extend_from_slice(chunk);
        normalize_line_endings(&mut self.buffer, start);
        let mut events = Vec::new();

        // Process complete event blocks (separated by a blank line). A blank
        // line can begin two bytes before the old end when a pending `\r` was
        // folded into a `\n`.
        while let Some(pos) = find_blank_line(&self.buffer, self.scanned.saturating_sub(2)) {
            let block: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            self.scanned = 0;
            if let Some(event) = Self::parse_block(&block[..pos]) {
                events.push(event);
            }
        }
        self.scanned = self.buffer.len();

        events
    }

    /// Flush whatever is left once the byte source is exhausted.
    ///
    /// A final block that was never terminated by a blank line is still
    /// parsed as an event.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        Self::parse_block(&rest)
    }

    /// Parse a single SSE block (lines between blank lines) into an event.
    fn parse_block(block: &[u8]) -> Option<SseEvent> {
        let text = match std::str::from_utf8(block) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!("Dropping SSE block with invalid UTF-8: {e}");
                return None;
            }
        };

        let mut event_type = None;
        let mut data_lines = Vec::new();

        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() || line.starts_with(':') {
                // Blank or comment line, skip
                continue;
            }

            if let Some((field, value)) = line.split_once(':') {
                // Trim leading space from value per SSE spec
                let value = value.strip_prefix(' ').unwrap_or(value);
                match field {
                    "event" => event_type = Some(value.to_string()),
                    "data" => data_lines.push(value.to_string()),
                    _ => {} // Ignore unknown fields
                }
            } else if line == "data" {
                // Field with no value
                data_lines.push(String::new());
            }
        }

        if data_lines.is_empty() {
            return None;
        }

        Some(SseEvent {
            event_type,
            data: data_lines.join("\n"),
        })
    }
}

/// Rewrite `\r\n` as `\n` in `buf[from..]`. A trailing lone `\r` is kept so
/// that it can pair with a `\n` arriving in the next chunk.
fn normalize_line_endings(buf: &mut Vec<u8>, from: usize) {
    if !buf[from..].contains(&b'\r') {
        return;
    }
    let tail = buf.split_off(from);
    let mut i = 0;
    while i < tail.len() {
        if tail[i] == b'\r' && tail.get(i + 1) == Some(&b'\n') {
            i += 1;
            continue;
        }
        buf.push(tail[i]);
        i += 1;
    }
}

/// Position of the first `\n\n` starting at or after `from`.
fn find_blank_line(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(2)
        .position(|w| w == b"\n\n")
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_event() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"event: message_start\ndata: {\"type\":\"message_start\"}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type.as_deref(), Some("message_start"));
        assert_eq!(events[0].data, "{\"type\":\"message_start\"}");
    }

    #[test]
    fn test_multiple_events() {
        let mut parser = SseParser::new();
        let events = parser.feed(
            b"event: ping\ndata: {}\n\nevent: message_start\ndata: {\"type\":\"message_start\"}\n\n",
        );
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type.as_deref(), Some("ping"));
        assert_eq!(events[1].event_type.as_deref(), Some("message_start"));
    }

    #[test]
    fn test_partial_event() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"event: ping\n");
        assert_eq!(events.len(), 0);
        let events = parser.feed(b"data: {}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type.as_deref(), Some("ping"));
    }

    #[test]
    fn test_comment_lines_ignored() {
        let mut parser = SseParser::new();
        let events = parser.feed(b": comment\nevent: ping\ndata: {}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type.as_deref(), Some("ping"));
    }

    #[test]
    fn test_multiple_data_lines_are_joined() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: first\ndata: second\n\n");
        assert_eq!(events[0].data, "first\nsecond");
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: hello\r\n\r").is_empty());
        let events = parser.feed(b"\ndata: next\r\n\r\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "hello");
        assert_eq!(events[1].data, "next");
    }

    #[test]
    fn test_split_inside_multibyte_char() {
        let frame = "data: caf\u{00e9}\n\n".as_bytes();
        let split = frame.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut parser = SseParser::new();
        assert!(parser.feed(&frame[..split]).is_empty());
        let events = parser.feed(&frame[split..]);
        assert_eq!(events[0].data, "caf\u{00e9}");
    }

    #[test]
    fn test_blank_line_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: a\n").is_empty());
        let events = parser.feed(b"\ndata: b\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "a");
        let events = parser.feed(b"\n");
        assert_eq!(events[0].data, "b");
    }

    #[test]
    fn test_large_event_fed_byte_by_byte() {
        let payload = "x".repeat(64 * 1024);
        let frame = format!("data: {payload}\r\n\r\ndata: tail\r\n\r\n");
        let mut parser = SseParser::new();
        let mut events = Vec::new();
        for byte in frame.as_bytes() {
            events.extend(parser.feed(std::slice::from_ref(byte)));
        }
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, payload);
        assert_eq!(events[1].data, "tail");
        assert_eq!(parser.scanned, 0);
    }

    #[test]
    fn test_finish_flushes_unterminated_block() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: tail").is_empty());
        let event = parser.finish().unwrap();
        assert_eq!(event.data, "tail");
        assert!(parser.finish().is_none());
    }
}
