//! EventSource port - 外部 event feed への接続
//!
//! at-least-once 配送、相関 ID をまたいだ順序保証なし。
//! 接続が切れたら `FeedLoop` が `connect()` をやり直します。

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::domain::{DomainEvent, FeedError};

pub type EventStream = Pin<Box<dyn Stream<Item = Result<DomainEvent, FeedError>> + Send>>;

#[async_trait]
pub trait EventSource: Send + Sync {
    async fn connect(&self) -> Result<EventStream, FeedError>;
}
