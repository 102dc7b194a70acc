//! Interrupt Table: correlation id -> the instruction that produced it.
//!
//! The only state shared between the dispatch path (writer), the sweep loop
//! (writer) and the Interrupt Handler (reader + writer). Every operation runs
//! under one mutex, so "check membership and consume" is a single step.
//!
//! Consuming an entry removes it from the live set but leaves a tombstone until
//! the entry's TTL runs out, so a redelivered copy of the same echo is dropped too.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::domain::{CorrelationId, InstructionId};
use crate::ports::Clock;

#[derive(Debug, Clone, PartialEq)]
pub struct InterruptEntry {
    pub correlation_id: CorrelationId,
    pub instruction_id: InstructionId,
    pub inserted_at: DateTime<Utc>,
    pub originating_type: &'static str,
    pub originating_payload: serde_json::Value,
}

/// Result of matching an inbound correlation id.
#[derive(Debug, Clone, PartialEq)]
pub enum EchoMatch {
    /// First echo of a locally committed instruction; the entry is now consumed.
    Consumed(InterruptEntry),
    /// A repeat of an echo that was already consumed inside the TTL.
    AlreadyConsumed,
    /// Unknown, expired, or never local.
    NoMatch,
}

struct Slot {
    entry: InterruptEntry,
    consumed: bool,
}

pub struct InterruptTable {
    slots: Mutex<HashMap<CorrelationId, Slot>>,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl InterruptTable {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CorrelationId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, entry: &InterruptEntry, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.inserted_at) > self.ttl
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Register a committed instruction. Replaces any previous entry for the id.
    pub fn insert(&self, entry: InterruptEntry) {
        let correlation_id = entry.correlation_id;
        let previous = self.lock().insert(
            correlation_id,
            Slot {
                entry,
                consumed: false,
            },
        );
        if previous.is_some() {
            tracing::warn!(%correlation_id, "interrupt entry replaced");
        }
    }

    /// Atomically match and consume.
    pub fn consume(&self, correlation_id: &CorrelationId) -> EchoMatch {
        let now = self.clock.now();
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(correlation_id) else {
            return EchoMatch::NoMatch;
        };
        if self.is_expired(&slot.entry, now) {
            slots.remove(correlation_id);
            return EchoMatch::NoMatch;
        }
        if slot.consumed {
            return EchoMatch::AlreadyConsumed;
        }
        slot.consumed = true;
        EchoMatch::Consumed(slot.entry.clone())
    }

    /// Delete everything older than the TTL. Returns how many slots were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut slots = self.lock();
        let before = slots.len();
        slots.retain(|_, slot| !self.is_expired(&slot.entry, now));
        before - slots.len()
    }

    /// Live (not yet consumed, not expired-and-swept) entries.
    pub fn len(&self) -> usize {
        self.lock().values().filter(|s| !s.consumed).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, correlation_id: &CorrelationId) -> bool {
        self.lock()
            .get(correlation_id)
            .is_some_and(|s| !s.consumed)
    }
}
