//! Receipt returned to the caller of a successful dispatch.

use serde::Serialize;
use tokio::time::Instant;

use super::ids::{CorrelationId, InstructionId};

#[derive(Debug, Clone, Serialize)]
pub struct DispatchReceipt {
    pub instruction_id: InstructionId,
    pub correlation_id: CorrelationId,
    pub instruction_type: &'static str,

    /// The authoritative result returned by the server.
    pub result: serde_json::Value,

    /// Network attempts it took (1 when the first call succeeded).
    pub attempts: u32,

    /// When the instruction reached Committed (not serialized).
    #[serde(skip)]
    pub completed_at: Instant,
}
