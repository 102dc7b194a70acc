use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::feed_loop::FeedLoop;
use super::sweep_loop::SweepLoop;
use crate::domain::CourierConfig;
use crate::interrupt::{InterruptHandler, InterruptTable};
use crate::ports::EventSource;

/// Background task group handle.
/// - `shutdown_tx` を drop するとループ全体が止まる
/// - `shutdown_and_join()` で全ループの終了を待てる
pub struct BackgroundTasks {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub(crate) fn spawn(
        table: Arc<InterruptTable>,
        interrupts: Arc<InterruptHandler>,
        source: Arc<dyn EventSource>,
        config: &CourierConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let sweep = SweepLoop::new(table, config.sweep_interval());
        let feed = FeedLoop::new(source, interrupts, config.reconnect_policy());

        let joins = vec![
            tokio::spawn(sweep.run(shutdown_rx.clone())),
            tokio::spawn(feed.run(shutdown_rx)),
        ];

        Self { shutdown_tx, joins }
    }

    /// Ask every loop to stop. An event already being handled finishes first.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(err) = join.await {
                tracing::warn!(%err, "background task ended abnormally");
            }
        }
    }
}

/// True when the loop should exit after `changed()` returned.
pub(super) fn shutdown_requested(
    changed: Result<(), watch::error::RecvError>,
    shutdown_rx: &watch::Receiver<bool>,
) -> bool {
    // A dropped sender counts as shutdown.
    changed.is_err() || *shutdown_rx.borrow()
}
