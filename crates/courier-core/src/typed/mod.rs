//! Typed - 型付き Instruction API
//!
//! instruction type の typo を型で排除し、Descriptor との対応付けを
//! 登録時に保証します。
//!
//! # 二層構造
//! - **表層（Typed）**: `Command` trait, `Descriptor<C>` trait - 型安全
//! - **内部（Dyn）**: `DynDescriptor` / `PreparedInstruction` - object-safe, type erasure

pub mod command;
pub mod descriptor;
pub mod registry;

#[cfg(test)]
pub(crate) mod fixtures;

pub use self::command::Command;
pub use self::descriptor::{
    CommitContext, Descriptor, DynDescriptor, PreparedInstruction, TypedDescriptor,
};
pub use self::registry::{InstructionRegistry, RegistryError};
