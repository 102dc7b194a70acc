//! SweepLoop - Interrupt Table の期限切れエントリ回収
//!
//! # フロー
//! 1. `sweep_interval` ごとに tick（遅れた tick は skip）
//! 2. `InterruptTable::sweep()` で TTL を過ぎたエントリと tombstone を削除
//! 3. shutdown が来たら抜ける

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use super::background::shutdown_requested;
use crate::interrupt::InterruptTable;

pub struct SweepLoop {
    table: Arc<InterruptTable>,
    interval: Duration,
}

impl SweepLoop {
    pub fn new(table: Arc<InterruptTable>, interval: Duration) -> Self {
        Self { table, interval }
    }

    pub fn sweep_once(&self) -> usize {
        let removed = self.table.sweep();
        if removed > 0 {
            let remaining = self.table.len();
            tracing::debug!(removed, remaining, "swept expired interrupt entries");
        }
        removed
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if shutdown_requested(changed, &shutdown_rx) {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.sweep_once();
                }
            }
        }
        tracing::debug!("sweep loop stopped");
    }
}
