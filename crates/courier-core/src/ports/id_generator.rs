//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::ids::{CorrelationId, InstructionId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は instruction ごとに新しい ID ペアを生成
///
/// 同じ payload を 2 回 dispatch しても ID は必ず異なる（coalescing しない）。
pub trait IdGenerator: Send + Sync {
    fn generate_instruction_id(&self) -> InstructionId;

    fn generate_correlation_id(&self) -> CorrelationId;
}

/// UlidGenerator は Clock の時刻 + 乱数で ULID を生成
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_instruction_id(&self) -> InstructionId {
        InstructionId::from(self.next_ulid())
    }

    fn generate_correlation_id(&self) -> CorrelationId {
        CorrelationId::from(self.next_ulid())
    }
}
