//! Interrupt Handler: single entry point for the pushed event feed.
//!
//! # フロー
//! 1. correlation id があれば Interrupt Table で照合（自分のエコーなら捨てる）
//! 2. それ以外は event_type に登録された handler 全てに配る
//! 3. handler の失敗（Err / panic）は個別に握りつぶしてログに残す

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;

use super::table::{EchoMatch, InterruptTable};
use crate::domain::{DomainEvent, HandlerError, HandlerId};
use crate::ports::MutationSink;

/// Reacts to events that did not originate locally.
///
/// # 使用例
/// ```ignore
/// struct TaskCompleted;
///
/// #[async_trait]
/// impl EventHandler for TaskCompleted {
///     async fn handle(&self, event: &DomainEvent, sink: &dyn MutationSink) -> Result<(), HandlerError> {
///         sink.upsert(Entity::new(format!("task:{}", event.aggregate_id), event.payload.clone()));
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(
        &self,
        event: &DomainEvent,
        sink: &dyn MutationSink,
    ) -> Result<(), HandlerError>;
}

/// Adapter for synchronous closures.
pub struct FnHandler<F>(F);

pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&DomainEvent, &dyn MutationSink) -> Result<(), HandlerError> + Send + Sync,
{
    FnHandler(f)
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&DomainEvent, &dyn MutationSink) -> Result<(), HandlerError> + Send + Sync,
{
    async fn handle(
        &self,
        event: &DomainEvent,
        sink: &dyn MutationSink,
    ) -> Result<(), HandlerError> {
        (self.0)(event, sink)
    }
}

/// What happened to one inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    /// Self-echo of a locally committed instruction; dropped.
    Echo,
    /// Another copy of an echo that was already dropped; dropped again.
    DuplicateEcho,
    /// Handed to every registered handler; `failed` of them returned an error or panicked.
    Delivered { handlers: usize, failed: usize },
    /// No handler registered for the event type; dropped.
    Unhandled,
}

type HandlerList = Vec<(HandlerId, Arc<dyn EventHandler>)>;

pub struct InterruptHandler {
    table: Arc<InterruptTable>,
    sink: Arc<dyn MutationSink>,
    handlers: RwLock<HashMap<String, HandlerList>>,
    next_handler_id: AtomicU64,
}

impl InterruptHandler {
    pub fn new(table: Arc<InterruptTable>, sink: Arc<dyn MutationSink>) -> Self {
        Self {
            table,
            sink,
            handlers: RwLock::new(HashMap::new()),
            next_handler_id: AtomicU64::new(1),
        }
    }

    pub fn on(&self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) -> HandlerId {
        let id = HandlerId(self.next_handler_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_type.into())
            .or_default()
            .push((id, handler));
        id
    }

    /// Returns false if no such handler was registered for the event type.
    pub fn off(&self, event_type: &str, handler_id: HandlerId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = handlers.get_mut(event_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != handler_id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(event_type);
        }
        removed
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_type)
            .map_or(0, Vec::len)
    }

    pub async fn handle(&self, event: DomainEvent) -> EventDisposition {
        if let Some(correlation_id) = event.local_correlation_id() {
            match self.table.consume(&correlation_id) {
                EchoMatch::Consumed(entry) => {
                    tracing::debug!(
                        event_id = %event.event_id,
                        event_type = %event.event_type,
                        %correlation_id,
                        instruction_id = %entry.instruction_id,
                        originating_type = entry.originating_type,
                        "dropping self-echo"
                    );
                    return EventDisposition::Echo;
                }
                EchoMatch::AlreadyConsumed => {
                    tracing::debug!(
                        event_id = %event.event_id,
                        %correlation_id,
                        "dropping repeated self-echo"
                    );
                    return EventDisposition::DuplicateEcho;
                }
                EchoMatch::NoMatch => {}
            }
        }

        // Snapshot so handlers may call on()/off() without deadlocking.
        let handlers: HandlerList = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();

        if handlers.is_empty() {
            tracing::warn!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                "no handler registered, dropping event"
            );
            return EventDisposition::Unhandled;
        }

        let sink: &dyn MutationSink = self.sink.as_ref();
        let runs = handlers.iter().map(|(id, handler)| {
            let id = *id;
            let run = AssertUnwindSafe(handler.handle(&event, sink)).catch_unwind();
            async move { (id, run.await) }
        });

        let mut failed = 0;
        for (handler_id, result) in join_all(runs).await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failed += 1;
                    tracing::warn!(
                        %handler_id,
                        event_id = %event.event_id,
                        event_type = %event.event_type,
                        error = %err,
                        "event handler failed"
                    );
                }
                Err(_panic) => {
                    failed += 1;
                    tracing::warn!(
                        %handler_id,
                        event_id = %event.event_id,
                        event_type = %event.event_type,
                        "event handler panicked"
                    );
                }
            }
        }

        EventDisposition::Delivered {
            handlers: handlers.len(),
            failed,
        }
    }
}
