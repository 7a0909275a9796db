// src/stream/codec.rs

use crate::errors::StreamError;
use crate::stream::event::LogEvent;

/// Incremental decoder for newline-delimited JSON events.
///
/// Chunks may split a line anywhere; incomplete trailing data is buffered
/// until the next chunk or [`NdjsonDecoder::finish`]. Blank lines are skipped,
/// and a `data: ` prefix is tolerated so SSE framing decodes too.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: String,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every complete event it finished.
    pub fn feed(&mut self, chunk: &str) -> Vec<Result<LogEvent, StreamError>> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            if let Some(event) = decode_line(&line) {
                events.push(event);
            }
        }

        events
    }

    /// Decode whatever is left once the source has ended.
    pub fn finish(&mut self) -> Option<Result<LogEvent, StreamError>> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest)
    }
}

fn decode_line(line: &str) -> Option<Result<LogEvent, StreamError>> {
    let line = line.trim();
    let line = line.strip_prefix("data:").map(str::trim_start).unwrap_or(line);
    if line.is_empty() {
        return None;
    }

    Some(serde_json::from_str(line).map_err(|e| StreamError::Decode(format!("{e}: {line}"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::event::LogEventKind;

    #[test]
    fn line_split_across_chunks_is_buffered() {
        let mut decoder = NdjsonDecoder::new();

        let first = decoder.feed(r#"{"type":"log","timestamp":"2026-05-01T10:00:00Z","mes"#);
        assert!(first.is_empty());

        let second = decoder.feed("sage\":\"profile_table\"}\n\n");
        assert_eq!(second.len(), 1);
        let event = second[0].as_ref().unwrap();
        assert_eq!(event.kind, LogEventKind::Log);
        assert_eq!(event.message.as_deref(), Some("profile_table"));
    }

    #[test]
    fn sse_prefix_and_trailing_line_decode() {
        let mut decoder = NdjsonDecoder::new();

        let events = decoder.feed("data: {\"type\":\"status\",\"timestamp\":\"2026-05-01T10:00:00Z\"}\n");
        assert_eq!(events.len(), 1);
        assert!(decoder.feed(r#"{"type":"complete","timestamp":"2026-05-01T10:00:01Z"}"#).is_empty());

        let last = decoder.finish().unwrap().unwrap();
        assert!(last.is_terminal());
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn malformed_line_is_a_decode_error() {
        let mut decoder = NdjsonDecoder::new();

        let events = decoder.feed("not json\n");

        assert!(matches!(events.as_slice(), [Err(StreamError::Decode(_))]));
    }
}
