//! Resource scheduler: serializes instructions that touch the same entities.
//!
//! Design:
//! - `active` holds the union of keys of every admitted, not yet terminal instruction.
//! - An instruction is admitted only if none of its keys is active; otherwise it waits.
//! - Every release re-runs admission over the waiters: highest priority first,
//!   FIFO among equal priorities, greedily admitting whatever is now free.
//! - Admission hands out a `ResourceGuard`; dropping it is the one and only release.
//!
//! Starvation: a low-priority waiter can be overtaken indefinitely by a stream of
//! higher-priority ones. There is no aging.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::domain::ResourceKey;

/// A waiting instruction.
///
/// Ordered so that `BinaryHeap` pops the highest priority first, then the
/// earliest arrival.
struct Waiter {
    priority: i32,
    seq: u64,
    keys: BTreeSet<ResourceKey>,
    admit: oneshot::Sender<ResourceGuard>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Waiter {}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            // Reverse: earlier arrivals win ties
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct SchedulerState {
    active: HashSet<ResourceKey>,
    waiting: BinaryHeap<Waiter>,
    next_seq: u64,
}

impl SchedulerState {
    fn is_free(&self, keys: &BTreeSet<ResourceKey>) -> bool {
        keys.iter().all(|k| !self.active.contains(k))
    }

    fn activate(&mut self, keys: &BTreeSet<ResourceKey>) {
        self.active.extend(keys.iter().cloned());
    }

    fn deactivate(&mut self, keys: &BTreeSet<ResourceKey>) {
        for k in keys {
            self.active.remove(k);
        }
    }
}

#[derive(Default)]
pub struct ResourceScheduler {
    state: Mutex<SchedulerState>,
}

impl ResourceScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until none of `keys` is held by another instruction, then hold them.
    ///
    /// Cancel-safe: dropping the future gives up the place in line, and a guard
    /// handed over concurrently is dropped with the channel, releasing its keys.
    pub async fn acquire(
        self: &Arc<Self>,
        keys: BTreeSet<ResourceKey>,
        priority: i32,
    ) -> ResourceGuard {
        loop {
            let rx = {
                let mut state = self.lock();
                if state.is_free(&keys) {
                    state.activate(&keys);
                    return ResourceGuard {
                        scheduler: Arc::clone(self),
                        keys,
                    };
                }
                let (tx, rx) = oneshot::channel();
                let seq = state.next_seq;
                state.next_seq += 1;
                tracing::debug!(?keys, priority, seq, "resource keys busy, waiting");
                state.waiting.push(Waiter {
                    priority,
                    seq,
                    keys: keys.clone(),
                    admit: tx,
                });
                rx
            };

            // A sender only goes away unsent if the waiter was discarded; queue again.
            if let Ok(guard) = rx.await {
                return guard;
            }
        }
    }

    /// Number of instructions waiting for admission.
    pub fn pending_count(&self) -> usize {
        self.lock()
            .waiting
            .iter()
            .filter(|w| !w.admit.is_closed())
            .count()
    }

    pub fn is_active(&self, key: &ResourceKey) -> bool {
        self.lock().active.contains(key)
    }

    pub fn active_keys(&self) -> BTreeSet<ResourceKey> {
        self.lock().active.iter().cloned().collect()
    }

    fn release(self: &Arc<Self>, keys: &BTreeSet<ResourceKey>) {
        let orphans = {
            let mut state = self.lock();
            state.deactivate(keys);
            self.admit_waiters(&mut state)
        };
        // Guards whose waiter went away; dropping them releases again (outside the lock).
        drop(orphans);
    }

    fn admit_waiters(self: &Arc<Self>, state: &mut SchedulerState) -> Vec<ResourceGuard> {
        let mut still_waiting = Vec::with_capacity(state.waiting.len());
        let mut orphans = Vec::new();

        while let Some(waiter) = state.waiting.pop() {
            if waiter.admit.is_closed() {
                continue;
            }
            if !state.is_free(&waiter.keys) {
                still_waiting.push(waiter);
                continue;
            }
            state.activate(&waiter.keys);
            tracing::debug!(
                keys = ?waiter.keys,
                priority = waiter.priority,
                seq = waiter.seq,
                "admitted"
            );
            let guard = ResourceGuard {
                scheduler: Arc::clone(self),
                keys: waiter.keys,
            };
            if let Err(guard) = waiter.admit.send(guard) {
                orphans.push(guard);
            }
        }

        state.waiting.extend(still_waiting);
        orphans
    }
}

/// Held resource keys of one admitted instruction. Released on drop.
pub struct ResourceGuard {
    scheduler: Arc<ResourceScheduler>,
    keys: BTreeSet<ResourceKey>,
}

impl ResourceGuard {
    pub fn keys(&self) -> &BTreeSet<ResourceKey> {
        &self.keys
    }
}

impl fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceGuard").field("keys", &self.keys).finish()
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        let keys = std::mem::take(&mut self.keys);
        self.scheduler.release(&keys);
    }
}
