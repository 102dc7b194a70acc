//! Ports - 抽象化レイヤー
//!
//! このモジュールは外部コラボレーターへのインターフェースを定義します。
//! core はこれらの trait にだけ依存し、具体的な実装は差し替え可能です。
//!
//! - **Transport**: ネットワーク呼び出し（HTTP など）
//! - **MutationSink**: view 側の状態コンテナ
//! - **EventSource**: サーバーから push される event feed
//! - **Clock / IdGenerator**: テスト容易性のための時刻・ID 生成

pub mod clock;
pub mod event_source;
pub mod id_generator;
pub mod sink;
pub mod transport;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_source::{EventSource, EventStream};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::sink::{Entity, MutationSink};
pub use self::transport::Transport;
