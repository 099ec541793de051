//! Client-facing streaming event types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::{ContentBlock, Role};
use super::usage::{Usage, UsageDelta};

/// One record of the public streaming protocol.
///
/// Block payloads and message deltas are passed through from the engine
/// essentially verbatim, so they stay as raw JSON values here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    MessageStart {
        message: MessageShell,
    },
    ContentBlockStart {
        index: usize,
        content_block: Value,
    },
    ContentBlockDelta {
        index: usize,
        delta: Value,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<UsageDelta>,
    },
    MessageStop,
    Error {
        error: WireError,
    },
}

impl WireEvent {
    /// SSE event name for this record.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MessageStart { .. } => "message_start",
            Self::ContentBlockStart { .. } => "content_block_start",
            Self::ContentBlockDelta { .. } => "content_block_delta",
            Self::ContentBlockStop { .. } => "content_block_stop",
            Self::MessageDelta { .. } => "message_delta",
            Self::MessageStop => "message_stop",
            Self::Error { .. } => "error",
        }
    }

}

/// The empty assistant message echoed in `message_start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageShell {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub role: Role,
    pub content: Vec<ContentBlock>,
    pub model: String,
    pub usage: Usage,
}

/// Error payload of a wire `error` event or an HTTP error body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}
