//! Delta accumulation logic for streaming responses.

use std::collections::{HashMap, VecDeque};

use crate::registry::calculate_cost;
use crate::types::{
    AssistantMessage, AssistantMessageEvent, Content, ContentDelta, Model, StopReason,
    TextContent, ThinkingContent, ToolCall, Usage,
};
use crate::Error;

/// Builds an [`AssistantMessage`] from content deltas, queuing the matching
/// unified events as it goes.
///
/// Vendor decoders push deltas in; the stream driver drains events out.
/// Consumers can also feed it finished events to rebuild a message.
#[derive(Debug)]
pub struct MessageBuilder {
    message: AssistantMessage,
    /// Raw argument JSON for tool calls that have not ended yet.
    partial_arguments: HashMap<usize, String>,
    pending: VecDeque<AssistantMessageEvent>,
}

impl MessageBuilder {
    /// Start an empty message attributed to `model`.
    pub fn new(model: &Model) -> Self {
        Self::from_message(AssistantMessage::empty_for(model))
    }

    fn from_message(message: AssistantMessage) -> Self {
        Self {
            message,
            partial_arguments: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn message(&self) -> &AssistantMessage {
        &self.message
    }

    /// Index the next new block will take.
    pub fn next_index(&self) -> usize {
        self.message.content.len()
    }

    pub fn has_tool_calls(&self) -> bool {
        self.message.tool_calls().next().is_some()
    }

    pub fn usage_mut(&mut self) -> &mut Usage {
        &mut self.message.usage
    }

    pub fn stop_reason(&self) -> StopReason {
        self.message.stop_reason
    }

    pub fn set_stop_reason(&mut self, stop_reason: StopReason) {
        self.message.stop_reason = stop_reason;
    }

    /// End with a vendor-reported failure.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.message.stop_reason = StopReason::Error;
        self.message.error_message = Some(message.into());
    }

    /// Flag the thinking block at `index` as redacted; its signature is the payload.
    pub fn mark_redacted(&mut self, index: usize) {
        if let Some(Content::Thinking(block)) = self.message.content.get_mut(index) {
            block.redacted = true;
        }
    }

    /// The `MessageStart` event for this message.
    pub fn start_event(&self) -> AssistantMessageEvent {
        AssistantMessageEvent::MessageStart {
            message: self.message.clone(),
        }
    }

    /// Apply `delta` to block `index` and queue the matching event.
    ///
    /// A delta addressed to `next_index()` opens a new block.
    pub fn apply(&mut self, index: usize, delta: ContentDelta) -> Result<(), Error> {
        self.apply_delta(index, &delta)?;
        self.pending
            .push_back(AssistantMessageEvent::ContentUpdate { index, delta });
        Ok(())
    }

    /// Queued events, oldest first.
    pub fn drain_events(&mut self) -> impl Iterator<Item = AssistantMessageEvent> + '_ {
        self.pending.drain(..)
    }

    /// Raw argument JSON received so far for the tool call at `index`.
    pub fn partial_arguments(&self, index: usize) -> Option<&str> {
        self.partial_arguments.get(&index).map(String::as_str)
    }

    /// End every tool call still receiving argument fragments.
    pub fn close_open_tool_calls(&mut self) -> Result<(), Error> {
        let mut open: Vec<usize> = self.partial_arguments.keys().copied().collect();
        open.sort_unstable();
        for index in open {
            let arguments = parse_arguments(self.partial_arguments(index).unwrap_or_default());
            self.apply(
                index,
                ContentDelta::ToolCallEnd {
                    arguments,
                    thought_signature: None,
                },
            )?;
        }
        Ok(())
    }

    /// Finalize: price the usage and return the message.
    pub fn finish(mut self, model: &Model) -> AssistantMessage {
        self.message.usage.refresh_total();
        calculate_cost(model, &mut self.message.usage);
        self.message
    }

    /// Finalize a cancelled stream. Content received so far is kept.
    pub fn abort(mut self, model: &Model) -> AssistantMessage {
        self.message.stop_reason = StopReason::Aborted;
        self.message.error_message = Some("Request was aborted".to_string());
        self.finish(model)
    }

    /// Rebuild a message from unified events, as a consumer would.
    pub fn process_event(&mut self, event: AssistantMessageEvent) -> Result<(), Error> {
        match event {
            AssistantMessageEvent::MessageStart { message } => {
                *self = Self::from_message(message);
            }
            AssistantMessageEvent::ContentUpdate { index, delta } => {
                self.apply_delta(index, &delta)?;
            }
            AssistantMessageEvent::MessageEnd { message } => {
                self.message = message;
                self.partial_arguments.clear();
            }
        }
        Ok(())
    }

    /// The message as built so far.
    pub fn into_message(self) -> AssistantMessage {
        self.message
    }

    fn apply_delta(&mut self, index: usize, delta: &ContentDelta) -> Result<(), Error> {
        let opens_block = index == self.message.content.len();
        if index > self.message.content.len() {
            return Err(Error::streaming(format!(
                "delta for block {index} skips past {} existing blocks",
                self.message.content.len()
            )));
        }

        match delta {
            ContentDelta::Text { text } => {
                if opens_block {
                    self.message.content.push(Content::Text(TextContent {
                        text: text.clone(),
                        signature: None,
                    }));
                    return Ok(());
                }
                match &mut self.message.content[index] {
                    Content::Text(block) => block.text.push_str(text),
                    _ => return Err(mismatch(index, "text")),
                }
            }
            ContentDelta::Thinking { text } => {
                if opens_block {
                    self.message.content.push(Content::Thinking(ThinkingContent {
                        thinking: text.clone(),
                        signature: None,
                        redacted: false,
                    }));
                    return Ok(());
                }
                match &mut self.message.content[index] {
                    Content::Thinking(block) => block.thinking.push_str(text),
                    _ => return Err(mismatch(index, "thinking")),
                }
            }
            ContentDelta::ThinkingSignature { signature } => {
                if opens_block {
                    // Signature-only reasoning (redacted or encrypted).
                    self.message.content.push(Content::Thinking(ThinkingContent {
                        thinking: String::new(),
                        signature: Some(signature.clone()),
                        redacted: false,
                    }));
                    return Ok(());
                }
                match &mut self.message.content[index] {
                    Content::Thinking(block) => block.signature = Some(signature.clone()),
                    Content::Text(block) => block.signature = Some(signature.clone()),
                    _ => return Err(mismatch(index, "thinking")),
                }
            }
            ContentDelta::ToolCallStart { id, name } => {
                if !opens_block {
                    return Err(mismatch(index, "new tool call"));
                }
                self.message.content.push(Content::ToolCall(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: serde_json::Value::Object(Default::default()),
                    thought_signature: None,
                }));
                self.partial_arguments.insert(index, String::new());
            }
            ContentDelta::ToolCallArguments { partial_json } => {
                if !matches!(self.message.content.get(index), Some(Content::ToolCall(_))) {
                    return Err(mismatch(index, "tool call"));
                }
                self.partial_arguments
                    .entry(index)
                    .or_default()
                    .push_str(partial_json);
            }
            ContentDelta::ToolCallEnd {
                arguments,
                thought_signature,
            } => {
                let Some(Content::ToolCall(call)) = self.message.content.get_mut(index) else {
                    return Err(mismatch(index, "tool call"));
                };
                call.arguments = arguments.clone();
                if thought_signature.is_some() {
                    call.thought_signature = thought_signature.clone();
                }
                self.partial_arguments.remove(&index);
            }
        }
        Ok(())
    }
}

fn mismatch(index: usize, expected: &str) -> Error {
    Error::streaming(format!("block {index} is not a {expected} block"))
}

/// Parse streamed tool arguments. Empty input is an empty object.
pub(crate) fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::Value::Object(Default::default());
    }
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "tool call arguments are not valid JSON");
            serde_json::Value::Object(Default::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(s: &str) -> ContentDelta {
        ContentDelta::Text { text: s.into() }
    }

    fn thinking(s: &str) -> ContentDelta {
        ContentDelta::Thinking { text: s.into() }
    }

    fn arguments(s: &str) -> ContentDelta {
        ContentDelta::ToolCallArguments {
            partial_json: s.into(),
        }
    }

    fn model() -> Model {
        crate::registry::ModelRegistry::builtin()
            .get_model("anthropic", "claude-sonnet-4-5")
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_interleaved_blocks() {
        let mut builder = MessageBuilder::new(&model());

        builder.apply(0, thinking("Let me ")).unwrap();
        builder.apply(0, thinking("check.")).unwrap();
        let signature = ContentDelta::ThinkingSignature {
            signature: "sig".into(),
        };
        builder.apply(0, signature).unwrap();
        builder.apply(1, text("Checking")).unwrap();
        builder
            .apply(
                2,
                ContentDelta::ToolCallStart {
                    id: "toolu_1".into(),
                    name: "get_weather".into(),
                },
            )
            .unwrap();
        builder.apply(2, arguments("{\"location\":")).unwrap();
        builder.apply(2, arguments("\"Paris\"}")).unwrap();
        assert_eq!(builder.partial_arguments(2), Some("{\"location\":\"Paris\"}"));
        builder.close_open_tool_calls().unwrap();

        assert_eq!(builder.drain_events().count(), 8);

        let message = builder.message();
        assert_eq!(message.thinking(), "Let me check.");
        assert_eq!(message.text(), "Checking");
        let call = message.tool_calls().next().unwrap();
        assert_eq!(call.arguments, json!({"location": "Paris"}));
        assert!(builder.partial_arguments(2).is_none());
    }

    #[test]
    fn test_delta_must_not_skip_blocks() {
        let mut builder = MessageBuilder::new(&model());
        assert!(builder.apply(1, text("x")).is_err());

        builder.apply(0, text("x")).unwrap();
        assert!(builder.apply(0, thinking("y")).is_err());
    }

    #[test]
    fn test_finish_prices_usage() {
        let model = model();
        let mut builder = MessageBuilder::new(&model);
        *builder.usage_mut() = Usage::new(1_000_000, 0, 0, 0);
        let message = builder.finish(&model);
        assert_eq!(message.usage.cost.input, model.cost.input);
        assert_eq!(message.usage.total_tokens, 1_000_000);
    }

    #[test]
    fn test_abort_keeps_content() {
        let model = model();
        let mut builder = MessageBuilder::new(&model);
        builder.apply(0, text("partial")).unwrap();
        let message = builder.abort(&model);
        assert_eq!(message.stop_reason, StopReason::Aborted);
        assert_eq!(message.text(), "partial");
    }

    #[test]
    fn test_rebuild_from_events() {
        let model = model();
        let mut producer = MessageBuilder::new(&model);
        let start = producer.start_event();
        producer.apply(0, text("Hello")).unwrap();
        producer.apply(0, text(" world")).unwrap();
        let updates: Vec<_> = producer.drain_events().collect();

        let mut consumer = MessageBuilder::new(&model);
        consumer.process_event(start).unwrap();
        for event in updates {
            consumer.process_event(event).unwrap();
        }
        assert_eq!(consumer.into_message().text(), "Hello world");
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_arguments(""), json!({}));
        assert_eq!(parse_arguments("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(parse_arguments("{\"a\":"), json!({}));
    }
}
