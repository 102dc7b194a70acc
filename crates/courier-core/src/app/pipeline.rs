//! Dispatcher pipeline: one instruction from lookup to a terminal state.
//!
//! Fetch -> Validate -> Schedule -> Optimistic Apply -> Execute -> Classify -> Write-back
//!
//! Suspension points are the admission wait and the network call (plus retry
//! backoff). Optimistic apply and commit run synchronously between them.
//! The `ResourceGuard` is held until the terminal transition has been recorded,
//! so a conflicting instruction never starts executing before this one is done.
//!
//! Dropping the dispatch future mid-flight (an outer timeout, a losing
//! `select!` branch, an aborted task) ends the instruction as Cancelled:
//! `Run`'s `Drop` rolls back the optimistic mutation before the keys go.

use std::future::pending;

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::courier::{Courier, DispatchOptions};
use crate::domain::{
    DispatchError, DispatchFailure, DispatchReceipt, FailureCause, Instruction, InstructionStatus,
};
use crate::interrupt::InterruptEntry;
use crate::sched::{Decision, ResourceGuard};
use crate::typed::{CommitContext, PreparedInstruction};

pub(super) async fn run(
    courier: &Courier,
    instruction_type: &str,
    payload: Value,
    options: DispatchOptions,
) -> Result<DispatchReceipt, DispatchError> {
    // Fetch
    let descriptor = courier
        .registry
        .lookup(instruction_type)
        .map_err(|_| DispatchError::UnknownInstructionType(instruction_type.to_string()))?;
    let prepared =
        descriptor
            .prepare(payload.clone())
            .map_err(|e| DispatchError::InvalidPayload {
                instruction_type: instruction_type.to_string(),
                message: e.to_string(),
            })?;

    let mut instruction = Instruction::new(
        courier.ids.generate_instruction_id(),
        courier.ids.generate_correlation_id(),
        descriptor.instruction_type(),
        payload,
    );
    instruction.priority = options.priority.unwrap_or(courier.config.default_priority);
    instruction.timeout = options
        .timeout
        .unwrap_or_else(|| courier.config.default_timeout());
    instruction.resource_keys = prepared
        .resource_keys()
        .into_iter()
        .chain(options.extra_resource_keys)
        .collect();

    let span = tracing::info_span!(
        "dispatch",
        instruction_id = %instruction.id,
        correlation_id = %instruction.correlation_id,
        instruction_type = instruction.instruction_type,
        priority = instruction.priority,
    );

    Run {
        courier,
        instruction,
        prepared,
        cancel: options.cancel,
        guard: None,
    }
    .drive()
    .instrument(span)
    .await
}

struct Run<'a> {
    courier: &'a Courier,
    instruction: Instruction,
    prepared: Box<dyn PreparedInstruction>,
    cancel: Option<CancellationToken>,
    /// Dropped after `Drop for Run` has rolled back.
    guard: Option<ResourceGuard>,
}

impl Run<'_> {
    async fn drive(mut self) -> Result<DispatchReceipt, DispatchError> {
        self.transition(InstructionStatus::Validating);
        if !self.prepared.validate() {
            return Err(self.fail(FailureCause::ValidationRejected));
        }

        // Schedule
        let courier = self.courier;
        let cancel = self.cancel.clone();
        let keys = self.instruction.resource_keys.clone();
        let admitted = tokio::select! {
            biased;
            _ = cancelled(cancel.as_ref()) => {
                return Err(self.fail(FailureCause::Cancelled));
            }
            guard = courier.scheduler.acquire(keys, self.instruction.priority) => guard,
        };
        self.guard = Some(admitted);
        self.transition(InstructionStatus::Scheduled);

        if self.prepared.optimistic_apply(courier.sink.as_ref()) {
            tracing::debug!("optimistic mutation applied");
        }

        self.transition(InstructionStatus::Executing);
        let timeout = self.instruction.timeout;
        let outcome = tokio::select! {
            biased;
            _ = cancelled(cancel.as_ref()) => Err(FailureCause::Cancelled),
            result = tokio::time::timeout(timeout, self.execute()) => {
                result.unwrap_or(Err(FailureCause::Timeout { timeout }))
            }
        };

        match outcome {
            Ok(result) => Ok(self.write_back(result)),
            Err(cause) => {
                if self.prepared.optimistic_rollback(courier.sink.as_ref()) {
                    tracing::warn!(%cause, "optimistic mutation rolled back");
                }
                let err = self.fail(cause);
                self.guard = None;
                Err(err)
            }
        }
    }

    /// Resolve the request and call the transport until the classifier says stop.
    async fn execute(&mut self) -> Result<Value, FailureCause> {
        let request = self.prepared.resolve_request()?;
        self.transition(InstructionStatus::AwaitingResponse);

        loop {
            self.instruction.attempts += 1;
            let attempt = self.instruction.attempts;
            tracing::debug!(
                attempt,
                method = %request.method,
                path = %request.path,
                "calling transport"
            );

            let outcome = self
                .courier
                .transport
                .execute(&request, self.instruction.correlation_id)
                .await;

            match self.courier.classifier.decide(attempt, outcome) {
                Decision::Commit(result) => return Ok(result),
                Decision::Retry { delay, error } => {
                    tracing::warn!(attempt, ?delay, %error, "retryable failure, backing off");
                    tokio::time::sleep(delay).await;
                }
                Decision::GiveUp(cause) => return Err(cause),
            }
        }
    }

    fn write_back(mut self, result: Value) -> DispatchReceipt {
        self.transition(InstructionStatus::Committing);
        let context = CommitContext {
            instruction_id: self.instruction.id,
            correlation_id: self.instruction.correlation_id,
            attempts: self.instruction.attempts,
        };
        self.prepared
            .commit(&result, &context, self.courier.sink.as_ref());

        let table = &self.courier.table;
        table.insert(InterruptEntry {
            correlation_id: self.instruction.correlation_id,
            instruction_id: self.instruction.id,
            inserted_at: table.now(),
            originating_type: self.instruction.instruction_type,
            originating_payload: self.instruction.payload.clone(),
        });

        self.transition(InstructionStatus::Committed);
        let completed_at = Instant::now();
        self.courier.counters.record_committed();
        tracing::info!(attempts = self.instruction.attempts, "instruction committed");
        self.guard = None;

        DispatchReceipt {
            instruction_id: self.instruction.id,
            correlation_id: self.instruction.correlation_id,
            instruction_type: self.instruction.instruction_type,
            result,
            attempts: self.instruction.attempts,
            completed_at,
        }
    }

    /// Terminal failure. The caller releases the guard afterwards.
    fn fail(&mut self, cause: FailureCause) -> DispatchError {
        let status = if matches!(cause, FailureCause::Cancelled) {
            InstructionStatus::Cancelled
        } else {
            InstructionStatus::Failed
        };
        self.transition(status);
        self.courier.counters.record_failed();

        match &cause {
            FailureCause::ValidationRejected => {
                tracing::info!("instruction rejected by validation");
            }
            FailureCause::Cancelled => {
                tracing::info!(attempts = self.instruction.attempts, "instruction cancelled");
            }
            _ => {
                tracing::error!(attempts = self.instruction.attempts, %cause, "instruction failed");
            }
        }

        DispatchFailure {
            instruction_id: self.instruction.id,
            correlation_id: self.instruction.correlation_id,
            instruction_type: self.instruction.instruction_type,
            attempts: self.instruction.attempts,
            cause,
        }
        .into()
    }

    fn transition(&mut self, next: InstructionStatus) {
        if let Err(err) = self.instruction.advance(next) {
            tracing::error!(%err, "pipeline attempted an illegal transition");
        }
    }
}

impl Drop for Run<'_> {
    fn drop(&mut self) {
        if self.instruction.status().is_terminal() {
            return;
        }
        if self
            .prepared
            .optimistic_rollback(self.courier.sink.as_ref())
        {
            tracing::warn!("dispatch dropped mid-flight, optimistic mutation rolled back");
        }
        let _ = self.fail(FailureCause::Cancelled);
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => pending().await,
    }
}
