//! FeedLoop - event feed の購読と再接続
//!
//! # フロー
//! 1. `EventSource::connect()`
//! 2. 届いた event を 1 つずつ Interrupt Handler に渡す
//! 3. stream が終わる / 壊れたら backoff してから 1 へ（接続に成功したら backoff はリセット）
//!
//! 1 件だけ decode できない event は skip し、接続は維持します。

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;

use super::background::shutdown_requested;
use crate::domain::FeedError;
use crate::interrupt::{EventDisposition, InterruptHandler};
use crate::ports::{EventSource, EventStream};
use crate::sched::RetryPolicy;

pub struct FeedLoop {
    source: Arc<dyn EventSource>,
    interrupts: Arc<InterruptHandler>,
    reconnect: RetryPolicy,
}

enum StreamEnd {
    Shutdown,
    Disconnected,
}

impl FeedLoop {
    pub fn new(
        source: Arc<dyn EventSource>,
        interrupts: Arc<InterruptHandler>,
        reconnect: RetryPolicy,
    ) -> Self {
        Self {
            source,
            interrupts,
            reconnect,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut failures: u32 = 0;

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let connected = tokio::select! {
                changed = shutdown_rx.changed() => {
                    if shutdown_requested(changed, &shutdown_rx) {
                        break;
                    }
                    continue;
                }
                connected = self.source.connect() => connected,
            };

            match connected {
                Ok(stream) => {
                    tracing::info!("event feed connected");
                    failures = 0;
                    if let StreamEnd::Shutdown = self.consume(stream, &mut shutdown_rx).await {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(%err, "event feed connect failed");
                }
            }

            failures = failures.saturating_add(1);
            let delay = self.reconnect.next_delay(failures);
            tracing::info!(?delay, failures, "reconnecting event feed");
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if shutdown_requested(changed, &shutdown_rx) {
                        break;
                    }
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
        tracing::debug!("feed loop stopped");
    }

    async fn consume(
        &self,
        mut stream: EventStream,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> StreamEnd {
        loop {
            let item = tokio::select! {
                changed = shutdown_rx.changed() => {
                    if shutdown_requested(changed, shutdown_rx) {
                        return StreamEnd::Shutdown;
                    }
                    continue;
                }
                item = stream.next() => item,
            };

            match item {
                Some(Ok(event)) => {
                    let event_id = event.event_id.clone();
                    match self.interrupts.handle(event).await {
                        EventDisposition::Delivered { failed, .. } if failed > 0 => {
                            tracing::debug!(
                                %event_id,
                                failed,
                                "event delivered with handler failures"
                            );
                        }
                        _ => {}
                    }
                }
                Some(Err(FeedError::Decode(message))) => {
                    tracing::warn!(%message, "skipping undecodable event");
                }
                Some(Err(err)) => {
                    tracing::warn!(%err, "event feed broke");
                    return StreamEnd::Disconnected;
                }
                None => {
                    tracing::info!("event feed ended");
                    return StreamEnd::Disconnected;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainEvent;
    use crate::impls::{ChannelEventSource, InMemorySink, ManualClock};
    use crate::interrupt::{InterruptTable, handler_fn};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: u32::MAX,
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_disconnect_and_skips_bad_items() {
        let table = Arc::new(InterruptTable::new(
            Duration::from_secs(10),
            Arc::new(ManualClock::default()),
        ));
        let interrupts = Arc::new(InterruptHandler::new(table, Arc::new(InMemorySink::new())));
        let seen = Arc::new(AtomicUsize::new(0));
        interrupts.on("entity.renamed", {
            let seen = Arc::clone(&seen);
            Arc::new(handler_fn(move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
        });

        let (source, feed) = ChannelEventSource::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(
            FeedLoop::new(Arc::new(source), Arc::clone(&interrupts), policy()).run(shutdown_rx),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(feed.connects(), 1);

        let event = DomainEvent::new("e-1", "entity.renamed", "1", serde_json::json!({}));
        feed.send_error(FeedError::Decode("garbage".into()));
        feed.send(event.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(feed.connects(), 1);

        feed.disconnect();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(feed.connects(), 2);

        feed.send(event);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        shutdown_tx.send(true).unwrap();
        join.await.unwrap();
    }
}
