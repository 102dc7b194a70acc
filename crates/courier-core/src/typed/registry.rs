//! InstructionRegistry - Descriptor の登録と管理
//!
//! 新しい instruction type を導入できるのはここだけです。
//! 二重登録はプログラミングエラーなので、`CourierBuilder` が build を拒否します。

use std::collections::HashMap;
use std::sync::Arc;

use super::command::Command;
use super::descriptor::{Descriptor, DynDescriptor, TypedDescriptor};

/// InstructionRegistry は型付き Descriptor を登録・管理
///
/// # 使用例
/// ```ignore
/// let mut registry = InstructionRegistry::new();
/// registry.register::<CompleteTask, _>(CompleteTaskDescriptor)?;
///
/// let descriptor = registry.lookup("task.complete")?;
/// ```
#[derive(Default)]
pub struct InstructionRegistry {
    descriptors: HashMap<&'static str, Arc<dyn DynDescriptor>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Descriptor for instruction type '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("Unknown instruction type '{0}'")]
    UnknownInstructionType(String),
}

impl InstructionRegistry {
    pub fn new() -> Self {
        Self {
            descriptors: HashMap::new(),
        }
    }

    pub fn register<C: Command, D: Descriptor<C>>(
        &mut self,
        descriptor: D,
    ) -> Result<(), RegistryError> {
        if self.descriptors.contains_key(C::TYPE) {
            return Err(RegistryError::AlreadyRegistered(C::TYPE.to_string()));
        }
        self.descriptors
            .insert(C::TYPE, Arc::new(TypedDescriptor::<C, D>::new(descriptor)));
        Ok(())
    }

    pub fn lookup(&self, instruction_type: &str) -> Result<Arc<dyn DynDescriptor>, RegistryError> {
        self.descriptors
            .get(instruction_type)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownInstructionType(instruction_type.to_string()))
    }

    pub fn contains(&self, instruction_type: &str) -> bool {
        self.descriptors.contains_key(instruction_type)
    }

    pub fn registered_types(&self) -> Vec<&'static str> {
        let mut types: Vec<&'static str> = self.descriptors.keys().copied().collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
