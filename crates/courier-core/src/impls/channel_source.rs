//! ChannelEventSource - mpsc で event を流し込む EventSource
//!
//! 1 回の `connect()` につき 1 本の接続を表します。`ChannelFeed::disconnect`
//! で接続を切ると stream が終わり、`FeedLoop` の再接続が走ります。
//!
//! 接続の中身は SSE のテキストです。`send` は event を 1 フレームに encode し、
//! 受信側は `sse_event_stream` で復元します（本物の feed と同じ経路）。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{DomainEvent, FeedError};
use crate::interrupt::{encode_sse_frame, sse_event_stream};
use crate::ports::{EventSource, EventStream};

type Chunk = Result<String, FeedError>;

#[derive(Default)]
struct Connections {
    current: Option<mpsc::UnboundedSender<Chunk>>,
    connects: usize,
}

/// Test/demo event source.
///
/// # 使用例
/// ```ignore
/// let (source, feed) = ChannelEventSource::new();
/// let background = courier.spawn_background(Arc::new(source));
/// feed.send(event);
/// ```
pub struct ChannelEventSource {
    connections: Arc<Mutex<Connections>>,
}

/// Producer side of a `ChannelEventSource`.
#[derive(Clone)]
pub struct ChannelFeed {
    connections: Arc<Mutex<Connections>>,
}

fn lock(connections: &Mutex<Connections>) -> MutexGuard<'_, Connections> {
    connections.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChannelEventSource {
    pub fn new() -> (Self, ChannelFeed) {
        let connections = Arc::new(Mutex::new(Connections::default()));
        (
            Self {
                connections: connections.clone(),
            },
            ChannelFeed { connections },
        )
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn connect(&self) -> Result<EventStream, FeedError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut connections = lock(&self.connections);
        connections.current = Some(tx);
        connections.connects += 1;
        let chunks = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        });
        Ok(sse_event_stream(chunks))
    }
}

impl ChannelFeed {
    /// Push an event on the current connection. False when nobody is connected.
    pub fn send(&self, event: DomainEvent) -> bool {
        match encode_sse_frame(&event) {
            Ok(frame) => self.send_chunk(Ok(frame)),
            Err(err) => {
                tracing::warn!(event_id = %event.event_id, error = %err, "event not encodable");
                false
            }
        }
    }

    /// Push raw SSE text. Frames may be split across calls.
    pub fn send_raw(&self, text: impl Into<String>) -> bool {
        self.send_chunk(Ok(text.into()))
    }

    /// Push a failure as the transport would report it.
    pub fn send_error(&self, error: FeedError) -> bool {
        self.send_chunk(Err(error))
    }

    fn send_chunk(&self, chunk: Chunk) -> bool {
        lock(&self.connections)
            .current
            .as_ref()
            .is_some_and(|tx| tx.send(chunk).is_ok())
    }

    /// End the current stream.
    pub fn disconnect(&self) {
        lock(&self.connections).current = None;
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.connections)
            .current
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// How many times the source has been connected.
    pub fn connects(&self) -> usize {
        lock(&self.connections).connects
    }
}
