//! Types for streaming responses.

use crate::types::AssistantMessage;

/// A change to the content block at a given index.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentDelta {
    /// Text appended to a text block (created on first delta).
    Text { text: String },
    /// Reasoning appended to a thinking block (created on first delta).
    Thinking { text: String },
    /// Opaque continuation token for the thinking block, replacing any previous one.
    ThinkingSignature { signature: String },
    /// A tool call block was opened.
    ToolCallStart { id: String, name: String },
    /// Raw JSON fragment of the tool call arguments.
    ToolCallArguments { partial_json: String },
    /// Tool call arguments are complete and parsed.
    ToolCallEnd {
        arguments: serde_json::Value,
        thought_signature: Option<String>,
    },
}

/// Events emitted by every vendor stream, in this order: one `MessageStart`,
/// any number of `ContentUpdate`, one `MessageEnd`.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantMessageEvent {
    /// The vendor accepted the request. `message` is empty apart from attribution.
    MessageStart { message: AssistantMessage },
    /// A delta applied to `message.content[index]`.
    ContentUpdate { index: usize, delta: ContentDelta },
    /// Final message with usage, cost and stop reason.
    MessageEnd { message: AssistantMessage },
}

impl AssistantMessageEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AssistantMessageEvent::MessageEnd { .. })
    }
}
