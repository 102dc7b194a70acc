//! Transport port - ネットワーク呼び出しの抽象化
//!
//! 具体的な HTTP 実装はこの crate の外に置きます。core が知る必要があるのは
//! resolve 済みの method/path/body と、correlation id を wire に載せる方法だけです
//! （HTTP なら `CORRELATION_HEADER`）。

use async_trait::async_trait;

use crate::domain::{CorrelationId, ResolvedRequest, TransportError};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one network call. Called again with the same correlation id on retry.
    async fn execute(
        &self,
        request: &ResolvedRequest,
        correlation_id: CorrelationId,
    ) -> Result<serde_json::Value, TransportError>;
}
