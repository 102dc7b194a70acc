//! Scheduling: resource admission, retry policy and response classification.

mod classify;
mod resource;
mod retry;

pub use classify::{Classification, Decision, ResponseClassifier, classify};
pub use resource::{ResourceGuard, ResourceScheduler};
pub use retry::RetryPolicy;
