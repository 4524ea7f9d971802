//! Incremental `text/event-stream` parser.
//!
//! Bytes are fed in arbitrary chunks as they arrive from the network;
//! complete events come out. Line and field handling follows the HTML
//! server-sent events interpretation rules:
//!
//! - lines end in `\n`, `\r\n`, or a lone `\r`
//! - a leading byte-order mark is dropped
//! - lines starting with `:` are comments
//! - `event`, `data`, `id`, and `retry` fields are understood, anything
//!   else is ignored
//! - a blank line dispatches the pending event, unless no data was
//!   collected for it
//!
//! A line longer than the parser's limit (1 MiB by default) is dropped
//! whole, so a server that never ends a line cannot grow the buffer
//! without bound.

use std::time::Duration;

use geosse_types::SseEvent;
use tracing::warn;

/// Event name used when the stream sets none.
const DEFAULT_EVENT: &str = "message";

/// Default longest line kept, in bytes.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Stateful parser for one HTTP response body.
#[derive(Debug)]
pub struct SseParser {
    line: Vec<u8>,
    max_line_bytes: usize,
    overflowed: bool,
    after_cr: bool,
    started: bool,
    event_type: String,
    data: String,
    last_event_id: Option<String>,
    retry: Option<Duration>,
}

impl Default for SseParser {
    fn default() -> Self {
        Self {
            line: Vec::new(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            overflowed: false,
            after_cr: false,
            started: false,
            event_type: String::new(),
            data: String::new(),
            last_event_id: None,
            retry: None,
        }
    }
}

impl SseParser {
    /// Create a parser with no last event id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop lines longer than `max` bytes instead of the default 1 MiB.
    #[must_use]
    pub const fn with_max_line_bytes(mut self, max: usize) -> Self {
        self.max_line_bytes = max;
        self
    }

    /// Create a parser that resumes from a previously seen event id.
    #[must_use]
    pub fn with_last_event_id(mut self, id: Option<String>) -> Self {
        self.last_event_id = id;
        self
    }

    /// The last event id set by the stream, if any.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// The reconnection time most recently requested with `retry:`.
    pub const fn retry(&self) -> Option<Duration> {
        self.retry
    }

    /// Feed a chunk of the response body, returning every event it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        for &byte in chunk {
            if self.after_cr {
                self.after_cr = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\n' => self.end_line(&mut events),
                b'\r' => {
                    self.after_cr = true;
                    self.end_line(&mut events);
                }
                _ if self.overflowed => {}
                _ if self.line.len() >= self.max_line_bytes => {
                    warn!(limit = self.max_line_bytes, "event stream line too long, dropping it");
                    self.overflowed = true;
                    self.line.clear();
                }
                _ => self.line.push(byte),
            }
        }
        events
    }

    fn end_line(&mut self, events: &mut Vec<SseEvent>) {
        if self.overflowed {
            self.overflowed = false;
            self.started = true;
            return;
        }
        let raw = std::mem::take(&mut self.line);
        let decoded = String::from_utf8_lossy(&raw);
        let mut line: &str = &decoded;
        if !self.started {
            self.started = true;
            line = line.strip_prefix('\u{feff}').unwrap_or(line);
        }
        if let Some(event) = self.process_line(line) {
            events.push(event);
        }
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
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
            "event" => value.clone_into(&mut self.event_type),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "id" => {
                if !value.contains('\0') {
                    self.last_event_id = Some(value.to_owned());
                }
            }
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(ms) = value.parse::<u64>() {
                        self.retry = Some(Duration::from_millis(ms));
                    }
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event_type = std::mem::take(&mut self.event_type);
        if self.data.is_empty() {
            return None;
        }
        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }
        Some(SseEvent {
            event: if event_type.is_empty() {
                DEFAULT_EVENT.to_owned()
            } else {
                event_type
            },
            data,
            id: self.last_event_id.clone().filter(|id| !id.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(input: &str) -> Vec<SseEvent> {
        SseParser::new().feed(input.as_bytes())
    }

    #[test]
    fn parses_named_event() {
        let events = parse_all("event: create\ndata: {\"properties\":{}}\n\n");
        assert_eq!(events, vec![SseEvent::new("create", "{\"properties\":{}}")]);
    }

    #[test]
    fn unnamed_event_defaults_to_message() {
        let events = parse_all("data: hello\n\n");
        assert_eq!(events, vec![SseEvent::new("message", "hello")]);
    }

    #[test]
    fn multiple_data_lines_join_with_newline() {
        let events = parse_all("data: a\ndata:b\ndata\n\n");
        assert_eq!(events, vec![SseEvent::new("message", "a\nb\n")]);
    }

    #[test]
    fn only_one_leading_space_is_stripped() {
        let events = parse_all("data:  padded\n\n");
        assert_eq!(events.first().map(|e| e.data.as_str()), Some(" padded"));
    }

    #[test]
    fn comments_and_unknown_fields_are_ignored() {
        let events = parse_all(": keep-alive\nfoo: bar\ndata: x\n\n");
        assert_eq!(events, vec![SseEvent::new("message", "x")]);
    }

    #[test]
    fn blank_line_without_data_dispatches_nothing_and_resets_type() {
        let events = parse_all("event: create\n\ndata: x\n\n");
        assert_eq!(events, vec![SseEvent::new("message", "x")]);
    }

    #[test]
    fn handles_crlf_and_cr_line_endings() {
        let events = parse_all("event: update\r\ndata: 1\r\n\r\ndata: 2\r\r");
        assert_eq!(
            events,
            vec![SseEvent::new("update", "1"), SseEvent::new("message", "2")]
        );
    }

    #[test]
    fn chunks_may_split_anywhere() {
        let input = "event: delete\r\ndata: {\"properties\":{\"id\":\"a1\"}}\r\n\r\n";
        let mut parser = SseParser::new();
        let mut events = Vec::new();
        for byte in input.as_bytes() {
            events.extend(parser.feed(std::slice::from_ref(byte)));
        }
        assert_eq!(
            events,
            vec![SseEvent::new("delete", "{\"properties\":{\"id\":\"a1\"}}")]
        );
    }

    #[test]
    fn multibyte_characters_survive_chunking() {
        let input = "data: Zürich\n\n".as_bytes();
        let mut parser = SseParser::new();
        let (head, tail) = input.split_at(8);
        let mut events = parser.feed(head);
        events.extend(parser.feed(tail));
        assert_eq!(events, vec![SseEvent::new("message", "Zürich")]);
    }

    #[test]
    fn leading_bom_is_dropped() {
        let events = parse_all("\u{feff}data: x\n\n");
        assert_eq!(events, vec![SseEvent::new("message", "x")]);
    }

    #[test]
    fn id_persists_across_events() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"id: 7\ndata: a\n\ndata: b\n\n");
        let ids: Vec<Option<String>> = events.into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![Some("7".to_owned()), Some("7".to_owned())]);
        assert_eq!(parser.last_event_id(), Some("7"));
    }

    #[test]
    fn id_with_nul_is_ignored() {
        let mut parser = SseParser::new().with_last_event_id(Some("3".to_owned()));
        parser.feed(b"id: a\0b\n\n");
        assert_eq!(parser.last_event_id(), Some("3"));
    }

    #[test]
    fn retry_requires_digits() {
        let mut parser = SseParser::new();
        parser.feed(b"retry: 2500\n\n");
        assert_eq!(parser.retry(), Some(Duration::from_millis(2500)));
        parser.feed(b"retry: 10s\n\n");
        assert_eq!(parser.retry(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn overlong_line_is_dropped_and_parsing_resumes() {
        let mut parser = SseParser::new().with_max_line_bytes(16);
        let mut events = parser.feed(b"event: create\ndata: ");
        for _ in 0..100 {
            events.extend(parser.feed(b"xxxxxxxxxx"));
        }
        assert!(parser.line.len() <= 16);
        events.extend(parser.feed(b"\ndata: ok\n\n"));
        assert_eq!(events, vec![SseEvent::new("create", "ok")]);
    }

    #[test]
    fn incomplete_event_is_held_back() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"event: create\ndata: {}").is_empty());
        assert_eq!(parser.feed(b"\n\n"), vec![SseEvent::new("create", "{}")]);
    }
}
