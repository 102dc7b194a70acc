//! Response classification: raw transport outcome -> next action.
//!
//! The classifier is pure. Sleeping, rollback and commit are the pipeline's job.

use std::time::Duration;

use serde_json::Value;

use super::retry::RetryPolicy;
use crate::domain::{FailureCause, TransportError};

/// Class of one raw outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Success(Value),
    /// Network error, transport timeout, 5xx.
    RetryableFailure(TransportError),
    /// 4xx and anything else the server will answer the same way again.
    FatalFailure(FailureCause),
}

/// The next action for an instruction after one network attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Commit(Value),
    Retry { delay: Duration, error: TransportError },
    GiveUp(FailureCause),
}

pub fn classify(outcome: Result<Value, TransportError>) -> Classification {
    match outcome {
        Ok(value) => Classification::Success(value),
        Err(err @ (TransportError::Network(_) | TransportError::Timeout)) => {
            Classification::RetryableFailure(err)
        }
        Err(err @ TransportError::Server { status, .. }) if (500..600).contains(&status) => {
            Classification::RetryableFailure(err)
        }
        Err(TransportError::Server { status, message }) => {
            Classification::FatalFailure(FailureCause::ServerRejected { status, message })
        }
    }
}

/// Combines classification with the retry budget.
#[derive(Debug, Clone)]
pub struct ResponseClassifier {
    retry_policy: RetryPolicy,
}

impl ResponseClassifier {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// `attempts` counts the attempt that produced `outcome`.
    pub fn decide(&self, attempts: u32, outcome: Result<Value, TransportError>) -> Decision {
        match classify(outcome) {
            Classification::Success(value) => Decision::Commit(value),
            Classification::FatalFailure(cause) => Decision::GiveUp(cause),
            Classification::RetryableFailure(error)
                if self.retry_policy.allows_another(attempts) =>
            {
                Decision::Retry {
                    delay: self.retry_policy.next_delay(attempts),
                    error,
                }
            }
            Classification::RetryableFailure(error) => {
                Decision::GiveUp(FailureCause::RetriesExhausted { last_error: error })
            }
        }
    }
}
