//! Server-sent events framing
//!
//! Turns arbitrarily split body bytes into complete events. Lines are cut at
//! the byte level on `\n`, which never occurs inside a multi-byte UTF-8
//! sequence, so a code point split across network chunks stays buffered
//! until its line completes. A partial line longer than the framer's limit
//! fails the stream instead of growing without bound.

use crate::http::{FaultKind, TransportFault};

/// Longest line the framer will buffer while waiting for its newline
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// One dispatched event
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// Value of the `event:` field, if any
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
}

impl SseEvent {
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
        }
    }

    pub fn named(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
        }
    }
}

#[derive(Debug)]
pub struct SseFramer {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to hold no newline
    scanned: usize,
    max_line_bytes: usize,
    event: Option<String>,
    data: Vec<String>,
}

impl Default for SseFramer {
    fn default() -> Self {
        Self::with_max_line_bytes(DEFAULT_MAX_LINE_BYTES)
    }
}

impl SseFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_line_bytes,
            event: None,
            data: Vec::new(),
        }
    }

    /// Feed bytes, returning every event completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>, TransportFault> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.buffer[from..].iter().position(|b| *b == b'\n') {
            let end = from + offset;
            let mut line = &self.buffer[start..end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            let line = String::from_utf8_lossy(line).into_owned();
            if let Some(event) = self.take_line(&line) {
                events.push(event);
            }
            start = end + 1;
            from = start;
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_line_bytes {
            self.buffer.clear();
            self.scanned = 0;
            return Err(TransportFault::new(
                FaultKind::TooLarge,
                format!("stream line exceeds {} bytes without a newline", self.max_line_bytes),
            ));
        }

        Ok(events)
    }

    /// Flush at end of input; an unterminated final event is still dispatched
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.scanned = 0;
            let line = String::from_utf8_lossy(rest.strip_suffix(b"\r").unwrap_or(&rest)).into_owned();
            if let Some(event) = self.take_line(&line) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn take_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            // id and retry carry nothing the normalizer needs
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent { event, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_lines_are_buffered() {
        let mut framer = SseFramer::new();
        assert!(framer.push(b"data: {\"a\"").unwrap().is_empty());
        assert!(framer.push(b":1}\n").unwrap().is_empty());
        let events = framer.push(b"\n").unwrap();
        assert_eq!(events, vec![SseEvent::data("{\"a\":1}")]);
    }

    #[test]
    fn test_crlf_and_comments() {
        let mut framer = SseFramer::new();
        let events = framer.push(b": keep-alive\r\n\r\nevent: ping\r\ndata: {}\r\n\r\n").unwrap();
        assert_eq!(events, vec![SseEvent::named("ping", "{}")]);
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let text = "data: héllo\n\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xc3).unwrap() + 1;
        let mut framer = SseFramer::new();
        assert!(framer.push(&text[..split]).unwrap().is_empty());
        assert_eq!(framer.push(&text[split..]).unwrap(), vec![SseEvent::data("héllo")]);
    }

    #[test]
    fn test_multiline_data_joined() {
        let mut framer = SseFramer::new();
        let events = framer.push(b"data: one\ndata: two\n\n").unwrap();
        assert_eq!(events[0].data, "one\ntwo");
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut framer = SseFramer::new();
        assert!(framer.push(b"data: [DONE]").unwrap().is_empty());
        assert_eq!(framer.finish(), Some(SseEvent::data("[DONE]")));
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn test_overlong_line_fails() {
        let mut framer = SseFramer::with_max_line_bytes(16);
        assert!(framer.push(b"data: 0123456").unwrap().is_empty());
        let fault = framer.push(b"789abcdef").unwrap_err();
        assert_eq!(fault.kind, FaultKind::TooLarge);
    }

    #[test]
    fn test_long_line_under_limit_survives_many_pushes() {
        let mut framer = SseFramer::with_max_line_bytes(64);
        assert!(framer.push(b"data: ").unwrap().is_empty());
        for _ in 0..40 {
            assert!(framer.push(b"x").unwrap().is_empty());
        }
        let events = framer.push(b"\n\n").unwrap();
        assert_eq!(events, vec![SseEvent::data("x".repeat(40))]);
    }
}
