//! Domain model (IDs, instructions, events, requests, errors, config).

pub mod config;
pub mod errors;
pub mod event;
pub mod ids;
pub mod instruction;
pub mod receipt;
pub mod request;

pub use self::config::{ConfigError, CourierConfig, FeedConfig, RetryConfig};
pub use self::errors::{
    DispatchError, DispatchFailure, FailureCause, FeedError, HandlerError, TransportError,
};
pub use self::event::DomainEvent;
pub use self::ids::{CorrelationId, HandlerId, InstructionId, ParseIdError};
pub use self::instruction::{Instruction, InstructionStatus, InvalidTransition, ResourceKey};
pub use self::receipt::DispatchReceipt;
pub use self::request::{
    BodyShape, CORRELATION_HEADER, Method, RequestTemplate, ResolveError, ResolvedRequest,
};
