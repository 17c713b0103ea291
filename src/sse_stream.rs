//! Stream adapter for parsing SSE (Server-Sent Events) from byte chunks.

use crate::Error;
use futures_util::{Stream, StreamExt};
use memchr::memmem;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

/// Largest event accepted before the stream is treated as corrupt.
const MAX_EVENT_BYTES: usize = 8 * 1024 * 1024;

/// A Server-Sent Events (SSE) event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    /// Event type (optional).
    pub event_type: Option<String>,
    /// Event data.
    pub data: String,
    /// Event ID (optional).
    pub id: Option<String>,
    /// Retry delay in milliseconds (optional).
    pub retry: Option<u64>,
}

impl SseEvent {
    /// Create a new SSE event with just data.
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            event_type: None,
            data: data.into(),
            id: None,
            retry: None,
        }
    }

    /// Create a new SSE event with event type and data.
    pub fn with_type(event_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event_type: Some(event_type.into()),
            data: data.into(),
            id: None,
            retry: None,
        }
    }

    /// `[DONE]` sentinel used by OpenAI-style streams.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// A stream adapter that parses SSE events from a byte stream.
/// Maintains internal state to handle events split across chunks.
pub struct SseStream<S> {
    inner: S,
    /// Incomplete raw bytes from previous chunks, line endings normalized to `\n`.
    buffer: Vec<u8>,
    /// Parsed events ready to be yielded
    events: VecDeque<SseEvent>,
    /// The previous chunk ended in `\r`; a leading `\n` belongs to it.
    trailing_cr: bool,
    /// Nothing has been buffered yet; a UTF-8 BOM may still appear.
    at_start: bool,
}

impl<S> SseStream<S> {
    /// Create a new SSE stream from a byte stream.
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            buffer: Vec::new(),
            events: VecDeque::new(),
            trailing_cr: false,
            at_start: true,
        }
    }

    /// Append a chunk, folding `\r\n` and lone `\r` into `\n`.
    fn push_chunk(&mut self, mut chunk: &[u8]) {
        if self.at_start {
            chunk = chunk.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(chunk);
            self.at_start = chunk.is_empty();
        }

        if !self.trailing_cr && memchr::memchr(b'\r', chunk).is_none() {
            self.buffer.extend_from_slice(chunk);
            return;
        }

        for &byte in chunk {
            if std::mem::take(&mut self.trailing_cr) && byte == b'\n' {
                continue;
            }
            if byte == b'\r' {
                self.buffer.push(b'\n');
                self.trailing_cr = true;
            } else {
                self.buffer.push(byte);
            }
        }
    }

    /// Parse complete SSE events from the buffer.
    fn parse_buffer(&mut self) -> Result<(), Error> {
        let separator = b"\n\n";
        let finder = memmem::Finder::new(separator);
        let mut start = 0;

        while let Some(pos) = finder.find(&self.buffer[start..]) {
            let event_end = start + pos;
            let event_bytes = &self.buffer[start..event_end];

            let event_text = std::str::from_utf8(event_bytes)
                .map_err(|e| Error::streaming(format!("Invalid UTF-8 in SSE event: {e}")))?;

            if let Some(event) = Self::parse_single_event(event_text) {
                self.events.push_back(event);
            }

            start = event_end + separator.len();
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        Ok(())
    }

    /// Parse a single complete SSE event from its text representation.
    fn parse_single_event(event_text: &str) -> Option<SseEvent> {
        let mut event_type = None;
        let mut data_lines = Vec::new();
        let mut id = None;
        let mut retry = None;

        for line in event_text.lines() {
            // Comments carry keep-alives.
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };

            match field {
                "event" => event_type = Some(value.to_string()),
                "data" => data_lines.push(value),
                "id" => id = Some(value.to_string()),
                "retry" => retry = value.trim().parse().ok(),
                other => tracing::trace!(field = other, "ignoring unknown SSE field"),
            }
        }

        if data_lines.is_empty() {
            return None;
        }

        Some(SseEvent {
            event_type,
            data: data_lines.join("\n"),
            id,
            retry,
        })
    }
}

impl<S, E> Stream for SseStream<S>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Item = Result<SseEvent, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }

            let chunk = match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    return Poll::Ready(Some(Err(Error::streaming(format!(
                        "Stream error: {}",
                        e.into()
                    )))));
                }
                None => {
                    // Streams may end without the final blank line.
                    if !self.buffer.is_empty() {
                        let remaining = std::mem::take(&mut self.buffer);
                        match std::str::from_utf8(&remaining) {
                            Ok(text) if !text.trim().is_empty() => {
                                if let Some(event) = Self::parse_single_event(text.trim()) {
                                    return Poll::Ready(Some(Ok(event)));
                                }
                                tracing::warn!(
                                    bytes = remaining.len(),
                                    "discarding trailing SSE fragment"
                                );
                            }
                            Ok(_) => {}
                            Err(_) => {
                                tracing::warn!(
                                    "discarding trailing SSE fragment with invalid UTF-8"
                                )
                            }
                        }
                    }
                    return Poll::Ready(None);
                }
            };

            self.push_chunk(&chunk);

            if self.buffer.len() > MAX_EVENT_BYTES {
                self.buffer.clear();
                return Poll::Ready(Some(Err(Error::streaming(
                    "SSE buffer exceeded maximum size",
                ))));
            }

            if let Err(e) = self.parse_buffer() {
                return Poll::Ready(Some(Err(e)));
            }
        }
    }
}

/// Extension trait to add SSE parsing to byte streams.
pub trait SseStreamExt: Stream {
    /// Parse this byte stream as SSE events.
    fn sse_events(self) -> SseStream<Self>
    where
        Self: Sized,
    {
        SseStream::new(self)
    }
}

impl<S: Stream> SseStreamExt for S {}
