//! courier-core
//!
//! Client-side instruction pipeline: typed commands go out through a
//! transport with optimistic local mutation, and the server's echo of our own
//! commits is recognized and dropped when it comes back on the event feed.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, instruction, event, request, receipt, errors, config）
//! - **ports**: 抽象化レイヤー（Transport, MutationSink, EventSource, Clock, IdGenerator）
//! - **typed**: 型付き Instruction API（Command trait, Descriptor trait, InstructionRegistry）
//! - **sched**: ResourceScheduler, RetryPolicy, ResponseClassifier
//! - **interrupt**: InterruptTable, InterruptHandler, SSE フレーム復元
//! - **app**: アプリケーション層（CourierBuilder, Courier, pipeline, SweepLoop, FeedLoop）
//! - **impls**: 実装（ScriptedTransport, InMemorySink など開発・テスト用）

pub mod app;
pub mod domain;
pub mod impls;
pub mod interrupt;
pub mod ports;
pub mod sched;
pub mod typed;

pub use app::{BackgroundTasks, BuildError, Courier, CourierBuilder, CourierStats, DispatchOptions};
pub use domain::{
    CourierConfig, DispatchError, DispatchFailure, DispatchReceipt, DomainEvent, FailureCause,
    HandlerError, ResourceKey,
};
pub use interrupt::{EventDisposition, EventHandler, handler_fn};
pub use typed::{Command, CommitContext, Descriptor};
