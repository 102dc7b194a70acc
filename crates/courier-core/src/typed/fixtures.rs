//! テスト用の Command / Descriptor

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{CommitContext, Command, Descriptor};
use crate::domain::{BodyShape, RequestTemplate, ResourceKey};
use crate::ports::{Entity, MutationSink};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameEntity {
    pub id: u64,
    pub title: String,
}

impl Command for RenameEntity {
    const TYPE: &'static str = "entity.rename";
}

pub struct RenameEntityDescriptor;

impl Descriptor<RenameEntity> for RenameEntityDescriptor {
    /// Entity key and its value before the rename (None if it did not exist).
    type Snapshot = (String, Option<Entity>);

    fn validate(&self, payload: &RenameEntity) -> bool {
        !payload.title.trim().is_empty()
    }

    fn resource_keys(&self, payload: &RenameEntity) -> Vec<ResourceKey> {
        vec![ResourceKey::entity("entity", payload.id)]
    }

    fn request(&self) -> RequestTemplate {
        RequestTemplate::patch("/entities/{id}").with_body(BodyShape::Without(vec!["id".into()]))
    }

    fn optimistic_apply(
        &self,
        payload: &RenameEntity,
        sink: &dyn MutationSink,
    ) -> Option<Self::Snapshot> {
        let key = format!("entity:{}", payload.id);
        let previous = sink.get(&key);
        let mut body = previous
            .as_ref()
            .map(|e| e.body.clone())
            .unwrap_or_else(|| json!({}));
        body["title"] = Value::String(payload.title.clone());
        sink.upsert(Entity::new(key.clone(), body));
        Some((key, previous))
    }

    fn optimistic_rollback(&self, (key, previous): Self::Snapshot, sink: &dyn MutationSink) {
        match previous {
            Some(entity) => sink.upsert(entity),
            None => sink.remove(&key),
        }
    }

    fn commit(
        &self,
        result: &Value,
        payload: &RenameEntity,
        _context: &CommitContext,
        sink: &dyn MutationSink,
    ) {
        sink.upsert(Entity::new(format!("entity:{}", payload.id), result.clone()));
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteEntity {
    pub id: u64,
}

impl Command for DeleteEntity {
    const TYPE: &'static str = "entity.delete";
}

pub struct DeleteEntityDescriptor;

impl Descriptor<DeleteEntity> for DeleteEntityDescriptor {
    type Snapshot = ();

    fn resource_keys(&self, payload: &DeleteEntity) -> Vec<ResourceKey> {
        vec![ResourceKey::entity("entity", payload.id)]
    }

    fn request(&self) -> RequestTemplate {
        RequestTemplate::delete("/entities/{id}")
    }

    fn commit(
        &self,
        _result: &Value,
        payload: &DeleteEntity,
        _context: &CommitContext,
        sink: &dyn MutationSink,
    ) {
        sink.remove(&format!("entity:{}", payload.id));
    }
}
