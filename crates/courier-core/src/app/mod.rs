//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **CourierBuilder**: 構築とワイヤリング（起動時検証）
//! - **Courier**: 公開 API（dispatch / on / off / stats / handle_event）
//! - **pipeline**: 1 instruction の Fetch → Validate → Schedule → Apply → Execute → Write-back
//! - **SweepLoop**: Interrupt Table の TTL 回収
//! - **FeedLoop**: event feed の購読と再接続

mod background;
pub mod builder;
pub mod courier;
pub mod feed_loop;
mod pipeline;
pub mod status;
pub mod sweep_loop;

pub use self::background::BackgroundTasks;
pub use self::builder::{BuildError, CourierBuilder};
pub use self::courier::{Courier, DispatchOptions};
pub use self::feed_loop::FeedLoop;
pub use self::status::CourierStats;
pub use self::sweep_loop::SweepLoop;
