//! Status - 実行統計

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time counters of one `Courier`.
///
/// # 使用例
/// ```ignore
/// let stats = courier.stats();
/// println!("{}", serde_json::to_string(&stats)?);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourierStats {
    /// Instructions that reached Committed.
    pub total_executed: u64,
    /// Instructions that ended Failed or Cancelled.
    pub total_failed: u64,
    /// Instructions waiting for resource admission.
    pub pending_count: usize,
    /// Live (unconsumed, unexpired) Interrupt Table entries.
    pub interrupt_table_size: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    executed: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    pub(crate) fn record_committed(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    pub(crate) fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}
