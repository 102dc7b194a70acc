//! Domain identifiers (strongly-typed IDs).
//!
//! ULID ベースの ID を Phantom type で区別します。
//! `InstructionId` と `CorrelationId` は同じ表現を持ちますが、型としては混同できません。
//!
//! - **InstructionId**: 1 回の dispatch 試行を識別（ログ・receipt 用）
//! - **CorrelationId**: ネットワーク呼び出しに付与し、event feed 上のエコーを照合する

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"ins-", "cor-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Returned when a string is not the display form of an id of the expected kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a valid {expected}* id: {input:?}")]
pub struct ParseIdError {
    pub expected: &'static str,
    pub input: String,
}

impl<T: IdMarker> FromStr for Id<T> {
    type Err = ParseIdError;

    /// Parses the display form (`<prefix><ulid>`). Event payloads carry
    /// correlation ids as plain strings, so this is how inbound ids are matched.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseIdError {
            expected: T::prefix(),
            input: s.to_string(),
        };
        let raw = s.strip_prefix(T::prefix()).ok_or_else(err)?;
        let ulid = Ulid::from_string(raw).map_err(|_| err())?;
        Ok(Self::from_ulid(ulid))
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Instruction {}

impl IdMarker for Instruction {
    fn prefix() -> &'static str {
        "ins-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Correlation {}

impl IdMarker for Correlation {
    fn prefix() -> &'static str {
        "cor-"
    }
}

/// Identifier of one attempted execution of a command.
pub type InstructionId = Id<Instruction>;

/// Token attached to an instruction's network call and echoed back on the event feed.
pub type CorrelationId = Id<Correlation>;

/// Handle returned by `on()`, used to unregister the same handler with `off()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandlerId(pub(crate) u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}
