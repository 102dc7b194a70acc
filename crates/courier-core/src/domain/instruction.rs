//! Instruction record and its status machine.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::ids::{CorrelationId, InstructionId};

/// Instruction status.
///
/// State transitions (forward only):
/// - Queued -> Validating -> Scheduled -> Executing -> AwaitingResponse -> Committing -> Committed
/// - any non-terminal -> Failed | Cancelled
///
/// Committed, Failed and Cancelled are absorbing. Stages may be skipped
/// (a rejected instruction goes Validating -> Failed), never revisited.
/// Network retries stay in AwaitingResponse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionStatus {
    Queued,
    Validating,
    Scheduled,
    Executing,
    AwaitingResponse,
    Committing,
    Committed,
    Failed,
    Cancelled,
}

impl InstructionStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Validating => 1,
            Self::Scheduled => 2,
            Self::Executing => 3,
            Self::AwaitingResponse => 4,
            Self::Committing => 5,
            Self::Committed => 6,
            Self::Failed => 7,
            Self::Cancelled => 8,
        }
    }

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Failed | Self::Cancelled)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed | Self::Cancelled => true,
            Self::Committed => self == Self::Committing,
            _ => next.rank() > self.rank(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid instruction transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: InstructionStatus,
    pub to: InstructionStatus,
}

/// Identifies an entity an instruction touches, e.g. `task:42`.
///
/// Instructions sharing any key are serialized by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// `kind:id` shorthand used by most descriptors.
    pub fn entity(kind: &str, id: impl fmt::Display) -> Self {
        Self(format!("{kind}:{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResourceKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One attempted execution of a typed command.
///
/// Owned exclusively by the pipeline for the duration of the attempt.
/// A failed instruction is never revived; resubmitting creates a new one
/// with fresh ids.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub id: InstructionId,
    pub correlation_id: CorrelationId,
    pub instruction_type: &'static str,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub timeout: Duration,
    pub resource_keys: BTreeSet<ResourceKey>,

    /// Network attempts made so far (the correlation id is shared by all of them).
    pub attempts: u32,

    status: InstructionStatus,
    pub created_at: Instant,
    pub updated_at: Instant,
}

impl Instruction {
    pub fn new(
        id: InstructionId,
        correlation_id: CorrelationId,
        instruction_type: &'static str,
        payload: serde_json::Value,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            correlation_id,
            instruction_type,
            payload,
            priority: 0,
            timeout: Duration::from_secs(15),
            resource_keys: BTreeSet::new(),
            attempts: 0,
            status: InstructionStatus::Queued,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> InstructionStatus {
        self.status
    }

    pub fn advance(&mut self, next: InstructionStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        tracing::debug!(
            instruction_id = %self.id,
            instruction_type = self.instruction_type,
            from = ?self.status,
            to = ?next,
            "instruction transition"
        );
        self.status = next;
        self.updated_at = Instant::now();
        Ok(())
    }
}
