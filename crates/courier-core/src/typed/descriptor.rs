//! Descriptor trait - instruction type ごとの振る舞い
//!
//! # 二層構造
//! - **表層（Typed）**: `Descriptor<C>` - payload は具体型 `C`、snapshot も具体型
//! - **内部（Dyn）**: `DynDescriptor` / `PreparedInstruction` - object-safe, type erasure
//!
//! `PreparedInstruction` は decode 済みの payload と optimistic snapshot を
//! 1 つの instruction の寿命の間だけ保持します。

use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;

use super::command::Command;
use crate::domain::{
    CorrelationId, InstructionId, RequestTemplate, ResolveError, ResolvedRequest, ResourceKey,
};
use crate::ports::MutationSink;

/// Passed to `commit` so the authoritative write can be tagged with its origin.
#[derive(Debug, Clone, Copy)]
pub struct CommitContext {
    pub instruction_id: InstructionId,
    pub correlation_id: CorrelationId,
    pub attempts: u32,
}

/// Static description of one instruction type. Registered once.
///
/// `validate`, `optimistic_apply` and `commit` run synchronously inside the
/// pipeline and must not block.
pub trait Descriptor<C: Command>: Send + Sync + 'static {
    /// What `optimistic_apply` keeps around to undo itself. Use `()` when unused.
    type Snapshot: Send + 'static;

    fn validate(&self, _payload: &C) -> bool {
        true
    }

    /// Entities this payload touches; used for serialization.
    fn resource_keys(&self, payload: &C) -> Vec<ResourceKey>;

    /// Declarative request shape.
    fn request(&self) -> RequestTemplate;

    fn resolve_request(&self, payload: &C) -> Result<ResolvedRequest, ResolveError> {
        let json = serde_json::to_value(payload).map_err(|e| ResolveError::Encode(e.to_string()))?;
        self.request().resolve(&json)
    }

    /// Provisional mutation applied before the network call.
    fn optimistic_apply(&self, _payload: &C, _sink: &dyn MutationSink) -> Option<Self::Snapshot> {
        None
    }

    fn optimistic_rollback(&self, _snapshot: Self::Snapshot, _sink: &dyn MutationSink) {}

    /// Replace the optimistic mutation with the authoritative result.
    fn commit(&self, result: &Value, payload: &C, context: &CommitContext, sink: &dyn MutationSink);
}

/// One decoded payload bound to its descriptor.
pub trait PreparedInstruction: Send {
    fn validate(&self) -> bool;

    fn resource_keys(&self) -> Vec<ResourceKey>;

    fn resolve_request(&self) -> Result<ResolvedRequest, ResolveError>;

    /// Returns true when a snapshot was taken.
    fn optimistic_apply(&mut self, sink: &dyn MutationSink) -> bool;

    /// Undo the optimistic mutation. Returns false when there was nothing to undo.
    fn optimistic_rollback(&mut self, sink: &dyn MutationSink) -> bool;

    fn commit(&mut self, result: &Value, context: &CommitContext, sink: &dyn MutationSink);
}

/// DynDescriptor は object-safe な Descriptor の抽象化
///
/// `HashMap<&str, Arc<dyn DynDescriptor>>` に格納できるようにします。
pub trait DynDescriptor: Send + Sync {
    fn instruction_type(&self) -> &'static str;

    fn prepare(&self, payload: Value) -> Result<Box<dyn PreparedInstruction>, serde_json::Error>;
}

pub struct TypedDescriptor<C: Command, D: Descriptor<C>> {
    descriptor: Arc<D>,
    _marker: PhantomData<fn() -> C>,
}

impl<C: Command, D: Descriptor<C>> TypedDescriptor<C, D> {
    pub fn new(descriptor: D) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            _marker: PhantomData,
        }
    }
}

impl<C: Command, D: Descriptor<C>> DynDescriptor for TypedDescriptor<C, D> {
    fn instruction_type(&self) -> &'static str {
        C::TYPE
    }

    fn prepare(&self, payload: Value) -> Result<Box<dyn PreparedInstruction>, serde_json::Error> {
        let payload: C = serde_json::from_value(payload)?;
        Ok(Box::new(Prepared::<C, D> {
            descriptor: Arc::clone(&self.descriptor),
            payload,
            snapshot: None,
        }))
    }
}

struct Prepared<C: Command, D: Descriptor<C>> {
    descriptor: Arc<D>,
    payload: C,
    snapshot: Option<D::Snapshot>,
}

impl<C: Command, D: Descriptor<C>> PreparedInstruction for Prepared<C, D> {
    fn validate(&self) -> bool {
        self.descriptor.validate(&self.payload)
    }

    fn resource_keys(&self) -> Vec<ResourceKey> {
        self.descriptor.resource_keys(&self.payload)
    }

    fn resolve_request(&self) -> Result<ResolvedRequest, ResolveError> {
        self.descriptor.resolve_request(&self.payload)
    }

    fn optimistic_apply(&mut self, sink: &dyn MutationSink) -> bool {
        self.snapshot = self.descriptor.optimistic_apply(&self.payload, sink);
        self.snapshot.is_some()
    }

    fn optimistic_rollback(&mut self, sink: &dyn MutationSink) -> bool {
        match self.snapshot.take() {
            Some(snapshot) => {
                self.descriptor.optimistic_rollback(snapshot, sink);
                true
            }
            None => false,
        }
    }

    fn commit(&mut self, result: &Value, context: &CommitContext, sink: &dyn MutationSink) {
        // The authoritative write supersedes the optimistic one.
        self.snapshot = None;
        self.descriptor.commit(result, &self.payload, context, sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemorySink;
    use crate::ports::Entity;
    use crate::typed::fixtures::{RenameEntity, RenameEntityDescriptor};
    use serde_json::json;
    use ulid::Ulid;

    fn context() -> CommitContext {
        CommitContext {
            instruction_id: InstructionId::from_ulid(Ulid::new()),
            correlation_id: CorrelationId::from_ulid(Ulid::new()),
            attempts: 1,
        }
    }

    #[test]
    fn prepare_decodes_and_reports_type() {
        let typed = TypedDescriptor::<RenameEntity, _>::new(RenameEntityDescriptor);
        assert_eq!(typed.instruction_type(), RenameEntity::TYPE);

        let prepared = typed.prepare(json!({"id": 42, "title": "new"})).unwrap();
        assert!(prepared.validate());
        assert_eq!(prepared.resource_keys(), vec![ResourceKey::entity("entity", 42)]);
        assert_eq!(prepared.resolve_request().unwrap().path, "/entities/42");
    }

    #[test]
    fn prepare_rejects_wrong_shape() {
        let typed = TypedDescriptor::<RenameEntity, _>::new(RenameEntityDescriptor);
        assert!(typed.prepare(json!({"id": "not a number"})).is_err());
    }

    #[test]
    fn rollback_restores_previous_value_once() {
        let sink = InMemorySink::new();
        sink.upsert(Entity::new("entity:42", json!({"title": "old"})));

        let typed = TypedDescriptor::<RenameEntity, _>::new(RenameEntityDescriptor);
        let mut prepared = typed.prepare(json!({"id": 42, "title": "new"})).unwrap();

        assert!(prepared.optimistic_apply(&sink));
        assert_eq!(sink.get("entity:42").unwrap().body["title"], "new");

        assert!(prepared.optimistic_rollback(&sink));
        assert_eq!(sink.get("entity:42").unwrap().body["title"], "old");
        assert!(!prepared.optimistic_rollback(&sink));
    }

    #[test]
    fn commit_drops_the_snapshot() {
        let sink = InMemorySink::new();
        let typed = TypedDescriptor::<RenameEntity, _>::new(RenameEntityDescriptor);
        let mut prepared = typed.prepare(json!({"id": 1, "title": "t"})).unwrap();

        prepared.optimistic_apply(&sink);
        prepared.commit(&json!({"id": 1, "title": "T"}), &context(), &sink);

        assert_eq!(sink.get("entity:1").unwrap().body["title"], "T");
        assert!(!prepared.optimistic_rollback(&sink));
    }
}
