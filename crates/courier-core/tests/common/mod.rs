#![allow(dead_code)]

use std::sync::Arc;

use courier_core::domain::{BodyShape, CorrelationId, RequestTemplate};
use courier_core::impls::{InMemorySink, ManualClock, ScriptedTransport};
use courier_core::ports::{Entity, MutationSink};
use courier_core::{
    Command, CommitContext, Courier, CourierBuilder, Descriptor, DomainEvent, ResourceKey,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEntity {
    pub id: u64,
    pub title: String,
}

impl Command for UpdateEntity {
    const TYPE: &'static str = "entity.update";
}

pub struct UpdateEntityDescriptor;

impl Descriptor<UpdateEntity> for UpdateEntityDescriptor {
    type Snapshot = (String, Option<Entity>);

    fn validate(&self, payload: &UpdateEntity) -> bool {
        !payload.title.trim().is_empty()
    }

    fn resource_keys(&self, payload: &UpdateEntity) -> Vec<ResourceKey> {
        vec![ResourceKey::entity("entity", payload.id)]
    }

    fn request(&self) -> RequestTemplate {
        RequestTemplate::patch("/entities/{id}").with_body(BodyShape::Without(vec!["id".into()]))
    }

    fn optimistic_apply(
        &self,
        payload: &UpdateEntity,
        sink: &dyn MutationSink,
    ) -> Option<Self::Snapshot> {
        let key = entity_key(payload.id);
        let previous = sink.get(&key);
        let mut body = previous
            .as_ref()
            .map(|e| e.body.clone())
            .unwrap_or_else(|| json!({}));
        body["title"] = Value::String(payload.title.clone());
        body["pending"] = Value::Bool(true);
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
        payload: &UpdateEntity,
        context: &CommitContext,
        sink: &dyn MutationSink,
    ) {
        let mut body = result.clone();
        body["correlationId"] = Value::String(context.correlation_id.to_string());
        sink.upsert(Entity::new(entity_key(payload.id), body));
    }
}

pub fn entity_key(id: u64) -> String {
    format!("entity:{id}")
}

pub fn update(id: u64, title: &str) -> UpdateEntity {
    UpdateEntity {
        id,
        title: title.to_string(),
    }
}

pub struct Harness {
    pub courier: Arc<Courier>,
    pub transport: Arc<ScriptedTransport>,
    pub sink: Arc<InMemorySink>,
    pub clock: Arc<ManualClock>,
}

pub fn harness(transport: ScriptedTransport) -> Harness {
    harness_with_sink(transport, InMemorySink::new())
}

pub fn harness_with_sink(transport: ScriptedTransport, sink: InMemorySink) -> Harness {
    let transport = Arc::new(transport);
    let sink = Arc::new(sink);
    let clock = Arc::new(ManualClock::default());
    let courier = CourierBuilder::new()
        .register::<UpdateEntity, _>(UpdateEntityDescriptor)
        .unwrap()
        .expect_instructions(&[UpdateEntity::TYPE])
        .transport(transport.clone())
        .sink(sink.clone())
        .clock(clock.clone())
        .build()
        .unwrap();
    Harness {
        courier: Arc::new(courier),
        transport,
        sink,
        clock,
    }
}

/// The event the backend pushes after applying one of our instructions.
pub fn echo_of(correlation_id: &CorrelationId) -> DomainEvent {
    DomainEvent::new(
        ulid::Ulid::new().to_string(),
        "entity.updated",
        "42",
        json!({"id": 42}),
    )
    .with_correlation_id(correlation_id.to_string())
}

/// Let spawned tasks run up to their next real suspension point.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
