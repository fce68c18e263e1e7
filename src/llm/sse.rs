//! Incremental line framing for streamed HTTP bodies.
//!
//! Both Server-Sent Events (OpenAI, llama.cpp) and newline-delimited JSON
//! (Ollama) arrive as arbitrary byte chunks. Lines are assembled from raw
//! bytes before UTF-8 decoding, so a multi-byte character split across two
//! network reads is never mangled.
//!
//! ```text
//! event: message
//! data: {"key": "value"}
//!
//! data: [DONE]
//! ```

/// Splits a byte stream into complete text lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk and return every line it completed, without terminators.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&raw[..raw.len() - 1]));
        }
        lines
    }

    /// Take the unterminated final line, if any.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(decode_line(&raw))
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// A parsed Server-Sent Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, if present.
    pub event_type: Option<String>,
    /// The `data:` field(s), joined with `\n`.
    pub data: String,
}

impl SseEvent {
    /// Whether this event is the `[DONE]` sentinel.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Incrementally parse SSE bytes, yielding events as they become complete.
#[derive(Debug, Default)]
pub struct SseLineParser {
    lines: LineBuffer,
    event_type: Option<String>,
    data_lines: Vec<String>,
}

impl SseLineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes and return the events it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.lines
            .push(chunk)
            .into_iter()
            .filter_map(|line| self.process_line(&line))
            .collect()
    }

    /// Emit whatever is left when the stream ends without a blank line.
    pub fn flush(&mut self) -> Option<SseEvent> {
        if let Some(line) = self.lines.flush() {
            if let Some(event) = self.process_line(&line) {
                return Some(event);
            }
        }
        self.take_event()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.take_event();
        }
        // Comment / keep-alive
        if line.starts_with(':') {
            return None;
        }
        if let Some((field, value)) = parse_field(line) {
            match field {
                "data" => self.data_lines.push(value.to_owned()),
                "event" => self.event_type = Some(value.to_owned()),
                _ => {}
            }
        }
        None
    }

    fn take_event(&mut self) -> Option<SseEvent> {
        if self.data_lines.is_empty() {
            self.event_type = None;
            return None;
        }
        let data = self.data_lines.join("\n");
        self.data_lines.clear();
        Some(SseEvent {
            event_type: self.event_type.take(),
            data,
        })
    }
}

/// Split `field: value`, dropping the single optional space after the colon.
fn parse_field(line: &str) -> Option<(&str, &str)> {
    let (field, value) = line.split_once(':')?;
    Some((field, value.strip_prefix(' ').unwrap_or(value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_field_variants() {
        assert_eq!(parse_field("data: hello"), Some(("data", "hello")));
        assert_eq!(parse_field("data:hello"), Some(("data", "hello")));
        assert_eq!(parse_field("data: {\"a\":1}"), Some(("data", "{\"a\":1}")));
        assert_eq!(parse_field("nodatahere"), None);
    }

    #[test]
    fn events_split_across_chunks() {
        let mut parser = SseLineParser::new();
        assert!(parser.push(b"data: hel").is_empty());
        let events = parser.push(b"lo\n\ndata: [DONE]\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "hello");
        assert!(events[1].is_done());
    }

    #[test]
    fn multi_line_data_and_event_type() {
        let mut parser = SseLineParser::new();
        let events = parser.push(b"event: delta\ndata: a\ndata: b\n\n");
        assert_eq!(events[0].event_type.as_deref(), Some("delta"));
        assert_eq!(events[0].data, "a\nb");
    }

    #[test]
    fn comments_and_crlf_are_handled() {
        let mut parser = SseLineParser::new();
        let events = parser.push(b": keep-alive\r\ndata: x\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn multibyte_char_split_between_chunks() {
        let bytes = "data: こんにちは\n\n".as_bytes();
        let (a, b) = bytes.split_at(8); // inside the first kana
        let mut parser = SseLineParser::new();
        assert!(parser.push(a).is_empty());
        let events = parser.push(b);
        assert_eq!(events[0].data, "こんにちは");
    }

    #[test]
    fn flush_emits_unterminated_event() {
        let mut parser = SseLineParser::new();
        assert!(parser.push(b"data: tail").is_empty());
        assert_eq!(parser.flush().map(|e| e.data), Some("tail".to_owned()));
        assert!(parser.flush().is_none());
    }

    #[test]
    fn line_buffer_yields_complete_lines() {
        let mut lines = LineBuffer::new();
        assert_eq!(lines.push(b"{\"a\":1}\n{\"b\""), vec!["{\"a\":1}".to_owned()]);
        assert_eq!(lines.push(b":2}\n"), vec!["{\"b\":2}".to_owned()]);
        assert!(lines.flush().is_none());
    }
}
