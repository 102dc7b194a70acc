//! MutationSink port - view 側の状態コンテナ
//!
//! core はここに書き込むだけで、読み出しは optimistic hook / commit / event handler が
//! 必要に応じて行います。同期 API なのは optimistic apply と commit が suspend しないため。

use serde::{Deserialize, Serialize};

/// An entity as the view layer stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(default)]
    pub body: serde_json::Value,
}

impl Entity {
    pub fn new(id: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }
}

/// Idempotent writes into the external state container.
pub trait MutationSink: Send + Sync {
    fn upsert(&self, entity: Entity);

    fn remove(&self, id: &str);

    /// Current value, used by optimistic hooks to take a rollback snapshot.
    fn get(&self, id: &str) -> Option<Entity>;
}
