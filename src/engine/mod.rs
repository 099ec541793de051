//! Interface contract for the execution engine.
//!
//! The engine is an external collaborator: it accepts one synthesized input
//! turn plus a configuration bundle and pushes back a finite event stream
//! that ends with exactly one terminal result on the happy path. Nothing in
//! this module executes anything; it only fixes the shapes the gateway
//! produces and consumes.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::types::{ContentBlock, PermissionMode, Role, UsageDelta};

/// The single synthesized turn handed to the engine per request.
///
/// Constructed fresh by the flattener for each invocation; immutable once
/// built. The role is always [`Role::User`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineInput {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl EngineInput {
    /// Degraded rendering for engines that only accept a string prompt:
    /// text blocks joined in order, images collapsed to a placeholder.
    pub fn to_plain_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.clone()),
                ContentBlock::Image { .. } => Some("[Image attached]".to_string()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Configuration bundle for one engine invocation.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub model: Option<String>,
    pub system_instruction: Option<String>,
    pub cwd: Option<String>,
    pub allowed_capabilities: Option<Vec<String>>,
    pub disallowed_capabilities: Option<Vec<String>>,
    pub permission_mode: PermissionMode,
    pub max_turns: Option<u32>,
    pub max_thinking_tokens: Option<u32>,
    pub env: HashMap<String, String>,
    /// Ask the engine to push per-block lifecycle/delta events in addition
    /// to whole assistant messages. Required for streaming responses.
    pub include_partial_events: bool,
}

/// One notification pushed by the engine during an invocation.
///
/// Kinds the gateway does not recognize deserialize into
/// [`EngineEvent::Unknown`] and are dropped by every consumer, so engine
/// evolution does not break in-flight translation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    MessageStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<UsageDelta>,
    },
    ContentBlockStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        #[serde(default)]
        content_block: Value,
    },
    ContentBlockDelta {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        #[serde(default)]
        delta: Value,
    },
    ContentBlockStop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },
    MessageDelta {
        #[serde(default)]
        delta: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<UsageDelta>,
    },
    MessageStop,
    /// A whole assistant-authored message.
    Assistant { message: EngineMessage },
    /// The terminal result carrying completion status and usage totals.
    Result(EngineResult),
    #[serde(other)]
    Unknown,
}

/// An assistant-authored message pushed by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineMessage {
    pub content: Vec<ContentBlock>,
}

/// The terminal result of an engine invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineResult {
    #[serde(default)]
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageDelta>,
}

/// Completion status reported by the terminal result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    #[default]
    Success,
    ErrorMaxTurns,
    ErrorDuringExecution,
}

/// Stream of engine events for one invocation. Finite, consumed exactly
/// once, front to back; not restartable.
pub type EngineStream = BoxStream<'static, Result<EngineEvent, GatewayError>>;

/// The execution engine behind the gateway.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Run one invocation.
    ///
    /// The engine must stop producing work promptly once `cancel` is
    /// triggered; a cancelled invocation surfaces as
    /// [`GatewayError::Cancelled`] on the stream, which consumers treat as
    /// clean termination.
    async fn invoke(
        &self,
        input: EngineInput,
        config: EngineConfig,
        cancel: CancellationToken,
    ) -> Result<EngineStream, GatewayError>;
}
