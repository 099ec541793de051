//! Common imports for gateway consumers.

pub use crate::engine::{
    EngineConfig, EngineEvent, EngineInput, EngineMessage, EngineResult, EngineStream,
    ExecutionEngine, ResultStatus,
};
pub use crate::error::{GatewayError, Result};
pub use crate::flatten::{flatten_conversation, FlattenedConversation};
pub use crate::metrics::RequestCounters;
pub use crate::server::{router, GatewayState};
pub use crate::translate::{aggregate_response, translate_stream, RequestContext};
pub use crate::types::*;
