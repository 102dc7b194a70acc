//! Command trait - 型付き instruction の定義
//!
//! # Trait Bounds
//! - `Serialize`: instruction record と request body を JSON で持つため
//! - `DeserializeOwned`: `dispatch_json` の境界で JSON から復元するため
//! - `Send + Sync + 'static`: pipeline の await をまたいで保持するため

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Command は instruction type 名と payload 型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct CompleteTask {
///     id: u64,
/// }
///
/// impl Command for CompleteTask {
///     const TYPE: &'static str = "task.complete";
/// }
/// ```
pub trait Command: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Registry key, `{entity}.{action}` by convention.
    const TYPE: &'static str;
}
