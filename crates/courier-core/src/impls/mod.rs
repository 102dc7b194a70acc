//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の in-process 実装を含めます。
//!
//! # 含まれる実装
//! - **ScriptedTransport**: 台本どおりに応答する Transport（遅延・失敗の注入、呼び出し記録）
//! - **InMemorySink**: HashMap ベースの MutationSink
//! - **ChannelEventSource**: mpsc で event を流し込む EventSource
//! - **ManualClock**: 手動で進める Clock（TTL のテスト用）
//!
//! # 本番用実装
//! HTTP transport や実際の SSE 接続はこの crate の外に置きます。
//! SSE のフレーム復元だけは `interrupt::sse` にあります。

pub mod channel_source;
pub mod inmem_sink;
pub mod manual_clock;
pub mod scripted_transport;

pub use self::channel_source::{ChannelEventSource, ChannelFeed};
pub use self::inmem_sink::InMemorySink;
pub use self::manual_clock::ManualClock;
pub use self::scripted_transport::{CallRecord, ScriptedResponse, ScriptedTransport};
