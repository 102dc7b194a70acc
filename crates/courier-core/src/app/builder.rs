//! CourierBuilder - Courier の構築とワイヤリング
//!
//! # 起動時検証（Fail-fast）
//! - 同じ instruction type の二重登録は `register()` が `RegistryError` を返す
//! - `expect_instructions()` の集合が登録済みでなければ `build()` が失敗する
//! - transport / sink が未設定、config が不正でも `build()` が失敗する

use std::sync::Arc;

use super::courier::{Courier, CourierParts};
use crate::domain::{ConfigError, CourierConfig};
use crate::interrupt::InterruptTable;
use crate::ports::{Clock, IdGenerator, MutationSink, SystemClock, Transport, UlidGenerator};
use crate::typed::{Command, Descriptor, InstructionRegistry, RegistryError};

/// CourierBuilder は Courier を構築
///
/// # 使用例
/// ```ignore
/// let courier = CourierBuilder::new()
///     .register::<RenameTask, _>(RenameTaskDescriptor)?
///     .expect_instructions(&["task.rename"])
///     .transport(Arc::new(HttpTransport::new(base_url)))
///     .sink(store.clone())
///     .build()?;
/// ```
pub struct CourierBuilder {
    registry: InstructionRegistry,
    expected: Option<Vec<String>>,
    config: CourierConfig,
    transport: Option<Arc<dyn Transport>>,
    sink: Option<Arc<dyn MutationSink>>,
    clock: Arc<dyn Clock>,
    id_generator: Option<Arc<dyn IdGenerator>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing instruction types: {0:?}. These were expected but not registered.")]
    MissingInstructionTypes(Vec<String>),

    #[error("No transport configured")]
    MissingTransport,

    #[error("No mutation sink configured")]
    MissingSink,

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

impl CourierBuilder {
    pub fn new() -> Self {
        Self {
            registry: InstructionRegistry::new(),
            expected: None,
            config: CourierConfig::default(),
            transport: None,
            sink: None,
            clock: Arc::new(SystemClock),
            id_generator: None,
        }
    }

    pub fn register<C: Command, D: Descriptor<C>>(
        mut self,
        descriptor: D,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<C, D>(descriptor)?;
        Ok(self)
    }

    pub fn expect_instructions(mut self, instruction_types: &[&str]) -> Self {
        self.expected = Some(instruction_types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn config(mut self, config: CourierConfig) -> Self {
        self.config = config;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn MutationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Clock for Interrupt Table TTLs and id timestamps.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Defaults to a `UlidGenerator` over the builder's clock.
    pub fn id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = Some(id_generator);
        self
    }

    pub fn build(self) -> Result<Courier, BuildError> {
        self.config.validate()?;

        if let Some(expected) = &self.expected {
            let missing: Vec<String> = expected
                .iter()
                .filter(|t| !self.registry.contains(t.as_str()))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingInstructionTypes(missing));
            }
        }

        let transport = self.transport.ok_or(BuildError::MissingTransport)?;
        let sink = self.sink.ok_or(BuildError::MissingSink)?;
        let ids: Arc<dyn IdGenerator> = match self.id_generator {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(Arc::clone(&self.clock))),
        };
        let table = Arc::new(InterruptTable::new(self.config.dedup_ttl(), self.clock));

        tracing::debug!(
            instruction_types = ?self.registry.registered_types(),
            dedup_ttl_ms = self.config.dedup_ttl_ms,
            "courier built"
        );

        Ok(Courier::from_parts(CourierParts {
            registry: self.registry,
            config: self.config,
            transport,
            sink,
            table,
            ids,
        }))
    }
}

impl Default for CourierBuilder {
    fn default() -> Self {
        Self::new()
    }
}
