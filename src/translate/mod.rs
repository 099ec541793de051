//! Engine-to-wire event translation.
//!
//! Two modes, chosen per request. Streaming mode mirrors the engine's
//! per-block lifecycle onto the public streaming protocol one event at a
//! time; aggregated mode drives the whole invocation to completion and
//! folds it into a single response. Both consume the engine stream exactly
//! once and share no state with other requests.

use std::collections::BTreeSet;

use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::debug;

use crate::engine::{EngineEvent, EngineResult, EngineStream, ResultStatus};
use crate::error::{GatewayError, Result};
use crate::types::{
    ContentBlock, MessageShell, MessagesResponse, Role, StopReason, Usage, WireError, WireEvent,
};

/// Request-scoped identifiers echoed into translated output.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub model: String,
}

/// Mutable state for one streamed translation. Created when streaming
/// begins, discarded when the stream ends or errors.
#[derive(Debug, Default)]
pub struct TranslationState {
    open_blocks: BTreeSet<usize>,
    message_started: bool,
    input_tokens: u64,
    output_tokens: u64,
}

impl TranslationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Final usage observed across the stream.
    pub fn usage(&self) -> Usage {
        Usage {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
        }
    }

    /// Whether a `message_start` has been seen without a matching
    /// `message_stop`.
    pub fn message_started(&self) -> bool {
        self.message_started
    }

    /// Fold one engine event into the state, producing at most one wire
    /// event. A missing block index defaults to 0.
    pub fn handle(&mut self, ctx: &RequestContext, event: EngineEvent) -> Option<WireEvent> {
        match event {
            EngineEvent::MessageStart { usage } => {
                self.open_blocks.clear();
                self.message_started = true;
                self.input_tokens = usage.and_then(|u| u.input_tokens).unwrap_or(0);
                Some(WireEvent::MessageStart {
                    message: MessageShell {
                        id: ctx.request_id.clone(),
                        kind: "message".to_string(),
                        role: Role::Assistant,
                        content: Vec::new(),
                        model: ctx.model.clone(),
                        usage: Usage {
                            input_tokens: self.input_tokens,
                            output_tokens: 0,
                        },
                    },
                })
            }
            EngineEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                let index = index.unwrap_or(0);
                // Engines may replay a start for a block that is already
                // open; re-emitting would corrupt the client's view.
                if !self.open_blocks.insert(index) {
                    return None;
                }
                Some(WireEvent::ContentBlockStart {
                    index,
                    content_block,
                })
            }
            EngineEvent::ContentBlockDelta { index, delta } => Some(WireEvent::ContentBlockDelta {
                index: index.unwrap_or(0),
                delta,
            }),
            EngineEvent::ContentBlockStop { index } => {
                let index = index.unwrap_or(0);
                self.open_blocks.remove(&index);
                Some(WireEvent::ContentBlockStop { index })
            }
            EngineEvent::MessageDelta { delta, usage } => {
                if let Some(output) = usage.and_then(|u| u.output_tokens) {
                    self.output_tokens = output;
                }
                Some(WireEvent::MessageDelta { delta, usage })
            }
            EngineEvent::MessageStop => {
                self.message_started = false;
                Some(WireEvent::MessageStop)
            }
            EngineEvent::Result(result) => {
                self.record_result(&result);
                None
            }
            EngineEvent::Assistant { .. } | EngineEvent::Unknown => None,
        }
    }

    fn record_result(&mut self, result: &EngineResult) {
        let Some(usage) = result.usage else {
            return;
        };
        if let Some(input) = usage.input_tokens {
            self.input_tokens = input;
        }
        if let Some(output) = usage.output_tokens {
            // A message_delta may already have reported a larger count.
            self.output_tokens = self.output_tokens.max(output);
        }
    }
}

/// Translate an engine stream into the public streaming protocol.
///
/// Any failure raised while iterating the engine stream surfaces as exactly
/// one wire `error` event, after which the sequence terminates.
/// Cancellation ends the sequence cleanly with no error event. The returned
/// stream yields one wire event per engine event and buffers nothing
/// beyond the per-block state, so slow consumers stall the engine stream
/// instead of growing a queue.
pub fn translate_stream(
    ctx: RequestContext,
    events: EngineStream,
) -> BoxStream<'static, WireEvent> {
    let stream = async_stream::stream! {
        let mut state = TranslationState::new();
        let mut inner = std::pin::pin!(events);
        while let Some(item) = inner.next().await {
            match item {
                Ok(event) => {
                    if let Some(wire) = state.handle(&ctx, event) {
                        yield wire;
                    }
                }
                Err(GatewayError::Cancelled) => break,
                Err(e) => {
                    yield WireEvent::Error {
                        error: WireError {
                            kind: "api_error".to_string(),
                            message: e.to_string(),
                        },
                    };
                    break;
                }
            }
        }
        let usage = state.usage();
        debug!(
            request_id = %ctx.request_id,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "stream translation finished"
        );
    };
    Box::pin(stream)
}

/// Accumulator for aggregated (non-streaming) mode.
#[derive(Debug, Default)]
pub struct Aggregator {
    content: Vec<ContentBlock>,
    result: Option<EngineResult>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one engine event into the accumulator.
    pub fn observe(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Assistant { message } => {
                for block in message.content {
                    match block {
                        ContentBlock::Text { .. }
                        | ContentBlock::Thinking { .. }
                        | ContentBlock::ToolUse { .. } => self.content.push(block),
                        _ => {}
                    }
                }
            }
            EngineEvent::Result(result) => self.result = Some(result),
            _ => {}
        }
    }

    /// Produce the final response, or fail if no terminal result was seen.
    /// Partial output is never returned as success.
    pub fn finish(self, ctx: &RequestContext) -> Result<MessagesResponse> {
        let Some(result) = self.result else {
            return Err(GatewayError::EngineProtocol(
                "no result message received".to_string(),
            ));
        };

        let stop_reason = match result.status {
            ResultStatus::Success => StopReason::EndTurn,
            ResultStatus::ErrorMaxTurns => StopReason::MaxTurns,
            ResultStatus::ErrorDuringExecution => StopReason::Error,
        };
        let usage = result
            .usage
            .map(|u| Usage {
                input_tokens: u.input_tokens.unwrap_or(0),
                output_tokens: u.output_tokens.unwrap_or(0),
            })
            .unwrap_or_default();

        let mut content = self.content;
        if content.is_empty() {
            // Clients rely on at least one block being present.
            content.push(ContentBlock::text(""));
        }

        Ok(MessagesResponse {
            id: ctx.request_id.clone(),
            kind: "message".to_string(),
            role: Role::Assistant,
            content,
            model: ctx.model.clone(),
            stop_reason: Some(stop_reason),
            usage,
        })
    }
}

/// Drive an engine stream to completion and fold it into one response.
///
/// Cancellation ends iteration cleanly, like the streaming path; whether a
/// response comes out then depends solely on whether the terminal result
/// was already observed.
pub async fn aggregate_response(
    ctx: &RequestContext,
    events: EngineStream,
) -> Result<MessagesResponse> {
    let mut aggregator = Aggregator::new();
    let mut inner = std::pin::pin!(events);
    while let Some(item) = inner.next().await {
        match item {
            Ok(event) => aggregator.observe(event),
            Err(GatewayError::Cancelled) => break,
            Err(e) => return Err(e),
        }
    }
    aggregator.finish(ctx)
}
