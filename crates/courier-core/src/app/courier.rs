//! Courier - 公開 API の表面
//!
//! Registry / Scheduler / Interrupt Table を 1 つの context object にまとめます。
//! グローバル状態は持たないので、テストごとに独立したインスタンスを作れます。

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::background::BackgroundTasks;
use super::pipeline;
use super::status::{Counters, CourierStats};
use crate::domain::{
    CourierConfig, DispatchError, DispatchReceipt, DomainEvent, HandlerId, ResourceKey,
};
use crate::interrupt::{EventDisposition, EventHandler, InterruptHandler, InterruptTable};
use crate::ports::{EventSource, IdGenerator, MutationSink, Transport};
use crate::sched::{ResourceScheduler, ResponseClassifier};
use crate::typed::{Command, InstructionRegistry};

/// Per-dispatch knobs. Everything is optional.
///
/// # 使用例
/// ```ignore
/// let options = DispatchOptions::new()
///     .priority(7)
///     .timeout(Duration::from_secs(5))
///     .resource_key("area:3");
/// ```
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Higher is admitted sooner. Defaults to `config.default_priority`.
    pub priority: Option<i32>,
    /// Bound on the Execute stage. Defaults to `config.default_timeout_ms`.
    pub timeout: Option<Duration>,
    /// Added to the descriptor's keys.
    pub extra_resource_keys: Vec<ResourceKey>,
    pub cancel: Option<CancellationToken>,
}

impl DispatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn resource_key(mut self, key: impl Into<ResourceKey>) -> Self {
        self.extra_resource_keys.push(key.into());
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Everything `CourierBuilder::build` wires together.
pub(crate) struct CourierParts {
    pub registry: InstructionRegistry,
    pub config: CourierConfig,
    pub transport: Arc<dyn Transport>,
    pub sink: Arc<dyn MutationSink>,
    pub table: Arc<InterruptTable>,
    pub ids: Arc<dyn IdGenerator>,
}

pub struct Courier {
    pub(super) registry: Arc<InstructionRegistry>,
    pub(super) scheduler: Arc<ResourceScheduler>,
    pub(super) table: Arc<InterruptTable>,
    pub(super) interrupts: Arc<InterruptHandler>,
    pub(super) transport: Arc<dyn Transport>,
    pub(super) sink: Arc<dyn MutationSink>,
    pub(super) ids: Arc<dyn IdGenerator>,
    pub(super) classifier: ResponseClassifier,
    pub(super) config: CourierConfig,
    pub(super) counters: Counters,
}

impl Courier {
    pub(crate) fn from_parts(parts: CourierParts) -> Self {
        let interrupts = Arc::new(InterruptHandler::new(
            Arc::clone(&parts.table),
            Arc::clone(&parts.sink),
        ));
        Self {
            registry: Arc::new(parts.registry),
            scheduler: Arc::new(ResourceScheduler::new()),
            classifier: ResponseClassifier::new(parts.config.retry_policy()),
            table: parts.table,
            interrupts,
            transport: parts.transport,
            sink: parts.sink,
            ids: parts.ids,
            config: parts.config,
            counters: Counters::default(),
        }
    }

    /// Run one typed command through the pipeline.
    ///
    /// Resolves once the instruction is terminal: `Ok` after Committed, `Err`
    /// after Failed/Cancelled with any optimistic mutation already rolled back.
    pub async fn dispatch<C: Command>(
        &self,
        payload: C,
        options: DispatchOptions,
    ) -> Result<DispatchReceipt, DispatchError> {
        let json = serde_json::to_value(&payload).map_err(|e| DispatchError::InvalidPayload {
            instruction_type: C::TYPE.to_string(),
            message: e.to_string(),
        })?;
        pipeline::run(self, C::TYPE, json, options).await
    }

    /// String-keyed dispatch for the JSON boundary.
    pub async fn dispatch_json(
        &self,
        instruction_type: &str,
        payload: Value,
        options: DispatchOptions,
    ) -> Result<DispatchReceipt, DispatchError> {
        pipeline::run(self, instruction_type, payload, options).await
    }

    pub fn on(&self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) -> HandlerId {
        self.interrupts.on(event_type, handler)
    }

    pub fn off(&self, event_type: &str, handler_id: HandlerId) -> bool {
        self.interrupts.off(event_type, handler_id)
    }

    /// Feed one inbound event through the Interrupt Handler.
    pub async fn handle_event(&self, event: DomainEvent) -> EventDisposition {
        self.interrupts.handle(event).await
    }

    pub fn stats(&self) -> CourierStats {
        CourierStats {
            total_executed: self.counters.executed(),
            total_failed: self.counters.failed(),
            pending_count: self.scheduler.pending_count(),
            interrupt_table_size: self.table.len(),
        }
    }

    /// Start the sweep loop and the event feed loop.
    pub fn spawn_background(&self, source: Arc<dyn EventSource>) -> BackgroundTasks {
        BackgroundTasks::spawn(
            Arc::clone(&self.table),
            Arc::clone(&self.interrupts),
            source,
            &self.config,
        )
    }

    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    pub fn registry(&self) -> &InstructionRegistry {
        &self.registry
    }

    pub fn interrupt_table(&self) -> &Arc<InterruptTable> {
        &self.table
    }
}
