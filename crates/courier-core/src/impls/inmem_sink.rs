//! InMemorySink - 開発用・テスト用の view state

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::ports::{Entity, MutationSink};

/// InMemorySink は entity を id ごとに保持するだけのコンテナ
///
/// # 使用例
/// ```ignore
/// let sink = Arc::new(InMemorySink::new());
/// let courier = CourierBuilder::new().sink(sink.clone()) /* ... */ .build()?;
/// assert_eq!(sink.get("entity:42").unwrap().body["title"], "new");
/// ```
#[derive(Debug, Default)]
pub struct InMemorySink {
    entities: Mutex<HashMap<String, Entity>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with initial entities.
    pub fn with_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let sink = Self::new();
        for entity in entities {
            sink.upsert(entity);
        }
        sink
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entity>> {
        self.entities.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ordered copy of the whole state, for before/after comparisons.
    pub fn snapshot(&self) -> BTreeMap<String, Entity> {
        self.lock()
            .iter()
            .map(|(id, entity)| (id.clone(), entity.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl MutationSink for InMemorySink {
    fn upsert(&self, entity: Entity) {
        self.lock().insert(entity.id.clone(), entity);
    }

    fn remove(&self, id: &str) {
        self.lock().remove(id);
    }

    fn get(&self, id: &str) -> Option<Entity> {
        self.lock().get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn upsert_is_idempotent() {
        let sink = InMemorySink::new();
        sink.upsert(Entity::new("entity:1", json!({"title": "a"})));
        sink.upsert(Entity::new("entity:1", json!({"title": "a"})));
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn remove_missing_is_a_no_op() {
        let sink = InMemorySink::with_entities([Entity::new("entity:1", json!({}))]);
        sink.remove("entity:2");
        sink.remove("entity:1");
        assert!(sink.is_empty());
    }

    #[test]
    fn snapshot_is_ordered_by_id() {
        let sink = InMemorySink::with_entities([
            Entity::new("b", json!(2)),
            Entity::new("a", json!(1)),
        ]);
        let ids: Vec<_> = sink.snapshot().into_keys().collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
