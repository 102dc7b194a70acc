//! Errors - エラー型と分類
//!
//! - **TransportError**: transport が返す生のエラー（classifier が retry/fatal に分類）
//! - **DispatchError**: `dispatch()` の呼び出し元に返るエラー
//! - **HandlerError**: event handler ごとに隔離されるエラー
//! - **FeedError**: event feed の接続・ストリームエラー（再接続で回復）

use std::time::Duration;

use super::ids::{CorrelationId, InstructionId};
use super::request::ResolveError;

/// Raw failure reported by a `Transport`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("server responded {status}: {message}")]
    Server { status: u16, message: String },

    #[error("request timed out")]
    Timeout,
}

/// Why an instruction that got ids failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureCause {
    #[error("payload rejected by validation")]
    ValidationRejected,

    #[error("server rejected the request ({status}): {message}")]
    ServerRejected { status: u16, message: String },

    #[error("retries exhausted: {last_error}")]
    RetriesExhausted { last_error: TransportError },

    #[error("timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("cancelled")]
    Cancelled,

    #[error("request could not be resolved: {0}")]
    Resolve(#[from] ResolveError),
}

/// A failed instruction, reported after rollback and key release.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("instruction {instruction_id} ({instruction_type}) failed after {attempts} attempt(s): {cause}")]
pub struct DispatchFailure {
    pub instruction_id: InstructionId,
    pub correlation_id: CorrelationId,
    pub instruction_type: &'static str,
    pub attempts: u32,
    #[source]
    pub cause: FailureCause,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown instruction type '{0}'")]
    UnknownInstructionType(String),

    #[error("payload for '{instruction_type}' does not decode: {message}")]
    InvalidPayload {
        instruction_type: String,
        message: String,
    },

    #[error(transparent)]
    Failed(#[from] DispatchFailure),
}

impl DispatchError {
    pub fn cause(&self) -> Option<&FailureCause> {
        match self {
            Self::Failed(failure) => Some(&failure.cause),
            _ => None,
        }
    }

    pub fn is_validation_rejected(&self) -> bool {
        matches!(self.cause(), Some(FailureCause::ValidationRejected))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.cause(), Some(FailureCause::Timeout { .. }))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause(), Some(FailureCause::Cancelled))
    }
}

/// Error returned by an event handler. Logged and isolated; never propagated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("event feed connect failed: {0}")]
    Connect(String),

    #[error("event feed stream failed: {0}")]
    Stream(String),

    #[error("event could not be decoded: {0}")]
    Decode(String),
}
