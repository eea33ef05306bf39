//! SSE frame decoding (lines -> discrete event records).
//!
//! The decoder is a single-pass accumulator over the SSE line grammar: it
//! buffers `event` / `data` / `id` / `retry` fields until an empty line
//! flushes a record. One decoder instance must not be reused across
//! independent streams.

use once_cell::sync::OnceCell;
use serde_json::Value;

use futures::{Stream, StreamExt};

use crate::{Error, Result};

/// One decoded SSE record.
///
/// `json()` parses `data` (falling back to `event` when `data` is empty)
/// exactly once and hands out the cached value on every later call.
#[derive(Debug, Clone)]
pub struct ServerSentEvent {
    event: Option<String>,
    data: String,
    id: Option<String>,
    retry: Option<u64>,
    parsed: OnceCell<Value>,
}

impl ServerSentEvent {
    pub fn new(event: Option<String>, data: String, id: Option<String>, retry: Option<u64>) -> Self {
        Self {
            event: event.filter(|event| !event.is_empty()),
            data,
            id,
            retry,
            parsed: OnceCell::new(),
        }
    }

    pub fn event(&self) -> Option<&str> {
        self.event.as_deref()
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Reconnection delay hint in milliseconds, if the stream sent one.
    pub fn retry(&self) -> Option<u64> {
        self.retry
    }

    /// Memoized JSON view of the record payload.
    pub fn json(&self) -> Result<&Value> {
        self.parsed.get_or_try_init(|| {
            let raw = if self.data.trim().is_empty() {
                self.event.as_deref().unwrap_or_default()
            } else {
                self.data.as_str()
            };
            serde_json::from_str(raw.trim()).map_err(Error::Decode)
        })
    }
}

/// Line-protocol state machine per the SSE event-stream grammar.
#[derive(Debug, Default)]
pub struct SseDecoder {
    event: Option<String>,
    data: Vec<String>,
    last_event_id: Option<String>,
    retry: Option<u64>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without its terminator); returns a record when the
    /// line completes a frame.
    pub fn decode_line(&mut self, line: &str) -> Option<ServerSentEvent> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            // A blank line with nothing accumulated is a no-op; this guards
            // against streams that open with a stray separator.
            if self.event.is_none()
                && self.data.is_empty()
                && self.last_event_id.is_none()
                && self.retry.is_none()
            {
                return None;
            }
            let record = ServerSentEvent::new(
                self.event.take(),
                self.data.join("\n"),
                // last-event-id survives the flush.
                self.last_event_id.clone(),
                self.retry.take(),
            );
            self.data.clear();
            return Some(record);
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => self.data.push(value.to_owned()),
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_owned()),
            "retry" => {
                if let Ok(millis) = value.parse::<u64>() {
                    self.retry = Some(millis);
                }
            }
            _ => {}
        }

        None
    }

    /// Synchronous driving mode: lazily decode a blocking line source.
    pub fn iter<I>(self, lines: I) -> EventIter<I>
    where
        I: Iterator<Item = Result<String>>,
    {
        EventIter {
            decoder: self,
            lines,
        }
    }

    /// Suspend-capable driving mode with identical semantics, built the
    /// same way the rest of the streaming plumbing builds decoders.
    pub fn into_stream<S>(self, lines: S) -> impl Stream<Item = Result<ServerSentEvent>> + Send
    where
        S: Stream<Item = Result<String>> + Send + Unpin,
    {
        futures::stream::unfold((self, lines), |(mut decoder, mut lines)| async move {
            while let Some(next) = lines.next().await {
                match next {
                    Ok(line) => {
                        if let Some(record) = decoder.decode_line(&line) {
                            return Some((Ok(record), (decoder, lines)));
                        }
                    }
                    Err(err) => return Some((Err(err), (decoder, lines))),
                }
            }
            None
        })
    }
}

/// Lazy record iterator over a blocking line source.
pub struct EventIter<I> {
    decoder: SseDecoder,
    lines: I,
}

impl<I> Iterator for EventIter<I>
where
    I: Iterator<Item = Result<String>>,
{
    type Item = Result<ServerSentEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        for line in self.lines.by_ref() {
            match line {
                Ok(line) => {
                    if let Some(record) = self.decoder.decode_line(&line) {
                        return Some(Ok(record));
                    }
                }
                Err(err) => return Some(Err(err)),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_lines_produce_nothing() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.decode_line(": keep-alive").is_none());
        assert!(decoder.decode_line("").is_none());
    }

    #[test]
    fn field_without_colon_appends_empty_value() {
        let mut decoder = SseDecoder::new();
        decoder.decode_line("data");
        decoder.decode_line("data: x");
        let record = decoder.decode_line("").unwrap();
        assert_eq!(record.data(), "\nx");
    }

    #[test]
    fn malformed_retry_is_ignored() {
        let mut decoder = SseDecoder::new();
        decoder.decode_line("retry: soon");
        decoder.decode_line("data: {}");
        let record = decoder.decode_line("").unwrap();
        assert_eq!(record.retry(), None);
    }

    #[test]
    fn crlf_terminated_lines_decode_like_lf() {
        let mut decoder = SseDecoder::new();
        decoder.decode_line("data: 1\r");
        let record = decoder.decode_line("\r").unwrap();
        assert_eq!(record.data(), "1");
    }
}
