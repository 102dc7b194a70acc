//! Interrupt - サーバーからの event を受け取る側
//!
//! - **InterruptTable**: 自分が commit した instruction の correlation id（TTL 付き）
//! - **InterruptHandler**: self-echo を捨て、残りを handler に配る
//! - **sse**: event feed の SSE フレームを `DomainEvent` に復元

pub mod handler;
pub mod sse;
pub mod table;

pub use self::handler::{EventDisposition, EventHandler, FnHandler, InterruptHandler, handler_fn};
pub use self::sse::{SseDecoder, decode_sse_frame, encode_sse_frame, sse_event_stream};
pub use self::table::{EchoMatch, InterruptEntry, InterruptTable};
