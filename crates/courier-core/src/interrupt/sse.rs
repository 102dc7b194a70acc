//! Server-Sent Events framing for the event feed.
//!
//! Frames are separated by a blank line. Inside a frame only `data:` lines
//! matter; they are joined with `\n` and parsed as one `DomainEvent`.
//! `event:` / `id:` / `retry:` lines are ignored, as are `:` comments.
//! A frame without data (keep-alive) yields nothing.

use futures::{Stream, StreamExt, stream};

use crate::domain::{DomainEvent, FeedError};
use crate::ports::EventStream;

/// Parse one complete frame. `None` when the frame carries no data.
pub fn decode_sse_frame(frame: &str) -> Option<Result<DomainEvent, FeedError>> {
    let mut data: Option<String> = None;

    for line in frame.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field != "data" {
            continue;
        }
        match data.as_mut() {
            Some(buf) => {
                buf.push('\n');
                buf.push_str(value);
            }
            None => data = Some(value.to_string()),
        }
    }

    let data = data?;
    if data.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(&data).map_err(|e| FeedError::Decode(e.to_string())))
}

/// Render one event as a complete frame (terminated by the blank line).
pub fn encode_sse_frame(event: &DomainEvent) -> Result<String, serde_json::Error> {
    let data = serde_json::to_string(event)?;
    Ok(format!("id: {}\ndata: {data}\n\n", event.event_id))
}

/// Incremental decoder for a chunked byte stream already decoded to text.
///
/// Chunks may split frames anywhere; incomplete input is buffered until the
/// terminating blank line arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Vec<Result<DomainEvent, FeedError>> {
        self.buffer.push_str(chunk);
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut events = Vec::new();
        while let Some(end) = self.buffer.find("\n\n") {
            let frame: String = self.buffer.drain(..end + 2).collect();
            if let Some(event) = decode_sse_frame(&frame) {
                events.push(event);
            }
        }
        events
    }

    /// Bytes waiting for the end of their frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Turn a stream of text chunks into an `EventStream`.
///
/// A chunk error is passed through as-is; the feed loop treats it as a broken
/// connection.
pub fn sse_event_stream<S>(chunks: S) -> EventStream
where
    S: Stream<Item = Result<String, FeedError>> + Send + 'static,
{
    let mut decoder = SseDecoder::new();
    chunks
        .flat_map(move |chunk| {
            let items = match chunk {
                Ok(text) => decoder.push(&text),
                Err(err) => vec![Err(err)],
            };
            stream::iter(items)
        })
        .boxed()
}
