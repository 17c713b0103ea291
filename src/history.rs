//! Structural repair of conversation history before it reaches a vendor.
//!
//! Every vendor rejects some shape of history: tool results without a
//! matching call, calls without results, consecutive user turns, or
//! reasoning signed by another model. [`transform_messages`] rewrites a
//! caller-owned history into a shape every adapter accepts. It is pure and
//! idempotent.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::types::{
    AssistantMessage, Content, CustomMessage, Message, Model, TextContent, ToolResultMessage,
    UserMessage,
};

/// Text of the result inserted for a tool call that never got one.
pub const MISSING_TOOL_RESULT: &str = "No result provided";

type Converter = Arc<dyn Fn(&CustomMessage) -> Vec<Message> + Send + Sync>;

/// Registered converters from application message kinds to core messages.
#[derive(Clone, Default)]
pub struct MessageExtensions {
    converters: HashMap<String, Converter>,
}

impl fmt::Debug for MessageExtensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&String> = self.converters.keys().collect();
        kinds.sort();
        f.debug_struct("MessageExtensions").field("kinds", &kinds).finish()
    }
}

impl MessageExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the converter for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, converter: F) -> &mut Self
    where
        F: Fn(&CustomMessage) -> Vec<Message> + Send + Sync + 'static,
    {
        self.converters.insert(kind.into(), Arc::new(converter));
        self
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.converters.contains_key(kind)
    }

    /// Lower a custom message, or `None` when its kind is unknown.
    pub fn lower(&self, message: &CustomMessage) -> Option<Vec<Message>> {
        self.converters.get(&message.kind).map(|convert| convert(message))
    }
}

/// Repair `messages` for a request to `model` with no custom message kinds.
pub fn transform_messages(messages: &[Message], model: &Model) -> Vec<Message> {
    transform_messages_with(messages, model, &MessageExtensions::default())
}

/// Repair `messages` for a request to `model`, lowering custom messages
/// through `extensions`.
pub fn transform_messages_with(
    messages: &[Message],
    model: &Model,
    extensions: &MessageExtensions,
) -> Vec<Message> {
    let lowered = lower_custom(messages, extensions);
    let survivors = drop_failed_turns(lowered);
    let scoped = scope_to_model(survivors, model);
    let paired = pair_tool_results(scoped);
    merge_user_runs(paired)
}

fn lower_custom(messages: &[Message], extensions: &MessageExtensions) -> Vec<Message> {
    let mut out = Vec::with_capacity(messages.len());
    for message in messages {
        match message {
            Message::Custom(custom) => match extensions.lower(custom) {
                // Converters must not smuggle custom messages back in.
                Some(lowered) => out.extend(
                    lowered
                        .into_iter()
                        .filter(|m| !matches!(m, Message::Custom(_))),
                ),
                None => {
                    tracing::debug!(kind = %custom.kind, "dropping unregistered custom message")
                }
            },
            other => out.push(other.clone()),
        }
    }
    out
}

/// Remove errored or aborted assistant turns and every result answering them.
fn drop_failed_turns(messages: Vec<Message>) -> Vec<Message> {
    let mut failed_calls: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(messages.len());

    for message in messages {
        match &message {
            Message::Assistant(assistant) if assistant.stop_reason.is_failure() => {
                failed_calls.extend(assistant.tool_calls().map(|c| c.id.clone()));
            }
            Message::Assistant(assistant) => {
                // A surviving turn may reissue an id; results after it answer it.
                for call in assistant.tool_calls() {
                    failed_calls.remove(&call.id);
                }
                out.push(message);
            }
            Message::ToolResult(result) if failed_calls.contains(&result.tool_call_id) => {}
            _ => out.push(message),
        }
    }
    out
}

/// Strip provenance that only the producing model can interpret.
fn scope_to_model(messages: Vec<Message>, model: &Model) -> Vec<Message> {
    messages
        .into_iter()
        .filter_map(|message| match message {
            Message::Assistant(assistant) if !produced_by(&assistant, model) => {
                let rewritten = foreign_assistant(assistant);
                (!rewritten.content.is_empty()).then_some(Message::Assistant(rewritten))
            }
            other => Some(other),
        })
        .collect()
}

fn produced_by(assistant: &AssistantMessage, model: &Model) -> bool {
    assistant.api == model.api && model.same_as(&assistant.provider, &assistant.model)
}

fn foreign_assistant(mut assistant: AssistantMessage) -> AssistantMessage {
    assistant.content = assistant
        .content
        .into_iter()
        .filter_map(|block| match block {
            Content::Thinking(thinking) => {
                if thinking.redacted || thinking.thinking.trim().is_empty() {
                    None
                } else {
                    Some(Content::text(thinking.thinking))
                }
            }
            Content::Text(text) => Some(Content::Text(TextContent {
                text: text.text,
                signature: None,
            })),
            Content::ToolCall(mut call) => {
                call.thought_signature = None;
                Some(Content::ToolCall(call))
            }
            other => Some(other),
        })
        .collect();
    assistant
}

/// Keep each tool result only directly after the assistant that issued its
/// call, once. Calls still open when the conversation moves on get a
/// synthetic error result.
fn pair_tool_results(messages: Vec<Message>) -> Vec<Message> {
    let mut out = Vec::with_capacity(messages.len());
    let mut open: Option<OpenCalls> = None;

    for message in messages {
        match message {
            Message::ToolResult(result) => {
                let Some(calls) = open.as_mut() else {
                    tracing::debug!(id = %result.tool_call_id, "dropping orphaned tool result");
                    continue;
                };
                if calls.answer(&result.tool_call_id) {
                    out.push(Message::ToolResult(result));
                } else {
                    tracing::debug!(id = %result.tool_call_id, "dropping unmatched tool result");
                }
            }
            Message::Assistant(assistant) => {
                if let Some(calls) = open.take() {
                    out.extend(calls.synthesize_missing());
                }
                open = OpenCalls::from_assistant(&assistant);
                out.push(Message::Assistant(assistant));
            }
            other => {
                if let Some(calls) = open.take() {
                    out.extend(calls.synthesize_missing());
                }
                out.push(other);
            }
        }
    }

    // Calls still open at the end are awaiting results from the caller.
    out
}

struct OpenCalls {
    calls: Vec<(String, String)>,
    answered: HashSet<String>,
    timestamp: i64,
}

impl OpenCalls {
    fn from_assistant(assistant: &AssistantMessage) -> Option<Self> {
        let calls: Vec<(String, String)> = assistant
            .tool_calls()
            .map(|c| (c.id.clone(), c.name.clone()))
            .collect();
        (!calls.is_empty()).then(|| OpenCalls {
            calls,
            answered: HashSet::new(),
            timestamp: assistant.timestamp,
        })
    }

    /// Record an answer; false for unknown or already answered ids.
    fn answer(&mut self, id: &str) -> bool {
        self.calls.iter().any(|(call, _)| call == id) && self.answered.insert(id.to_string())
    }

    /// One error result per unanswered id, even if the call repeated it.
    fn synthesize_missing(self) -> Vec<Message> {
        let OpenCalls {
            calls,
            mut answered,
            timestamp,
        } = self;
        calls
            .into_iter()
            .filter(|(id, _)| answered.insert(id.clone()))
            .map(|(id, name)| {
                Message::ToolResult(ToolResultMessage {
                    tool_call_id: id,
                    tool_name: name,
                    content: vec![Content::text(MISSING_TOOL_RESULT)],
                    is_error: true,
                    timestamp,
                })
            })
            .collect()
    }
}

fn merge_user_runs(messages: Vec<Message>) -> Vec<Message> {
    let mut out: Vec<Message> = Vec::with_capacity(messages.len());
    for message in messages {
        if let Message::User(UserMessage { content, .. }) = &message {
            if let Some(Message::User(previous)) = out.last_mut() {
                previous.content.extend(content.iter().cloned());
                continue;
            }
        }
        out.push(message);
    }
    out
}
