//! Conversation flattening.
//!
//! The engine accepts a single input turn per invocation, so the gateway
//! collapses the request's full turn list into one synthesized user turn:
//! an optional delimited history block, the current question, and any image
//! blocks attached to the current turn. History is a lossy plain-text
//! projection; it gives the engine situational awareness of prior turns,
//! not an exact reconstruction.

use crate::engine::EngineInput;
use crate::error::{GatewayError, Result};
use crate::types::{ChatMessage, ContentBlock, MessageContent, Role, ToolResultContent};

/// Maximum characters of a tool result kept in the history projection,
/// ellipsis included.
const TOOL_RESULT_PREVIEW_LIMIT: usize = 200;

const HISTORY_OPEN: &str = "<conversation_history>";
const HISTORY_CLOSE: &str = "</conversation_history>";
const QUESTION_OPEN: &str = "<current_question>";
const QUESTION_CLOSE: &str = "</current_question>";

const HISTORY_PREAMBLE: &str = "The following block is prior conversation context only. \
Do not respond to it directly; answer only the current question that follows it.";

/// Outcome of flattening a request's turn list.
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenedConversation {
    /// The single synthesized turn handed to the engine.
    pub input: EngineInput,
    /// Instruction extracted from a leading system turn, if any.
    pub system_instruction: Option<String>,
}

/// Collapse an ordered turn list into one engine input.
///
/// A leading system turn is extracted as an instruction rather than
/// history. After that, the list must be non-empty and end with a user
/// turn; anything else is a validation failure and the engine is never
/// invoked.
pub fn flatten_conversation(messages: &[ChatMessage]) -> Result<FlattenedConversation> {
    let (system_instruction, turns) = split_leading_system(messages);

    let Some((current, history)) = turns.split_last() else {
        return Err(GatewayError::validation("messages must not be empty"));
    };
    if current.role != Role::User {
        return Err(GatewayError::validation("last turn must be user"));
    }

    let mut content = Vec::new();
    if !history.is_empty() {
        content.push(ContentBlock::text(render_history(history)));
    }
    content.push(ContentBlock::text(render_current_question(current)));
    content.extend(image_blocks(current));

    Ok(FlattenedConversation {
        input: EngineInput {
            role: Role::User,
            content,
        },
        system_instruction,
    })
}

fn split_leading_system(messages: &[ChatMessage]) -> (Option<String>, &[ChatMessage]) {
    match messages.first() {
        Some(first) if first.role == Role::System => {
            (Some(project_text(first)), &messages[1..])
        }
        _ => (None, messages),
    }
}

/// Render all history turns as one delimited block. Turn text is escaped
/// so embedded markup cannot be confused with the block's own structure.
fn render_history(history: &[ChatMessage]) -> String {
    let mut block = String::new();
    block.push_str(HISTORY_PREAMBLE);
    block.push_str("\n\n");
    block.push_str(HISTORY_OPEN);
    block.push('\n');
    for turn in history {
        let tag = match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
            // A system turn past the first position is malformed input.
            Role::System => continue,
        };
        let text = escape_text(&project_text(turn));
        block.push_str(&format!("<{tag}>{text}</{tag}>\n"));
    }
    block.push_str(HISTORY_CLOSE);
    block
}

/// Wrap the current turn's projection. Not escaped: this is the live
/// instruction, not embedded untrusted history.
fn render_current_question(current: &ChatMessage) -> String {
    format!(
        "{QUESTION_OPEN}\n{}\n{QUESTION_CLOSE}",
        project_text(current)
    )
}

fn image_blocks(current: &ChatMessage) -> Vec<ContentBlock> {
    let MessageContent::Blocks(blocks) = &current.content else {
        return Vec::new();
    };
    blocks
        .iter()
        .filter(|block| matches!(block, ContentBlock::Image { .. }))
        .cloned()
        .collect()
}

/// Single-turn plain-text projection used for history rendering and system
/// instruction extraction.
pub fn project_text(message: &ChatMessage) -> String {
    match &message.content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .filter_map(project_block)
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn project_block(block: &ContentBlock) -> Option<String> {
    match block {
        ContentBlock::Text { text } => Some(text.clone()),
        ContentBlock::Image { .. } => Some("[Image attached]".to_string()),
        ContentBlock::ToolUse { name, .. } => Some(format!("[Used tool: {name}]")),
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            ..
        } => {
            let raw = match content {
                ToolResultContent::Text(text) => text.clone(),
                ToolResultContent::Parts(parts) => {
                    serde_json::to_string(parts).unwrap_or_default()
                }
            };
            Some(format!(
                "[Tool result for {tool_use_id}]: {}",
                truncate(&raw, TOOL_RESULT_PREVIEW_LIMIT)
            ))
        }
        ContentBlock::Thinking { .. } | ContentBlock::Unknown => None,
    }
}

/// Replace `& < > " '` with their named escape sequences.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
