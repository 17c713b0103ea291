//! OpenAI Chat Completions API and compatible servers.

use reqwest::Client;
use std::collections::HashMap;

use super::compat::{resolve, Compat};
use super::completions_types::*;
use crate::accumulator::MessageBuilder;
use crate::provider::{
    check_payload, drive, http_client, parse_event, prepare_context, send, strip_unsupported_input,
    with_headers, ApiProvider, Flow, StreamDecoder,
};
use crate::providers::shared::{collapse, unknown_stop_reason, Collapsed, IdStyle, ToolIdMap};
use crate::registry::supports_xhigh;
use crate::sse_stream::SseEvent;
use crate::thinking::ThinkingTagParser;
use crate::types::{
    Api, AssistantMessage, Content, ContentDelta, Context, MaxTokensField, Message, Model,
    StopReason, StreamOptions, ThinkingFormat, ThinkingLevel,
};
use crate::{AssistantStream, Error};

const PROVIDER: &str = "openai-completions";

/// Chat Completions provider.
pub struct OpenAICompletionsProvider {
    client: Client,
}

impl OpenAICompletionsProvider {
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            client: http_client()?,
        })
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ApiProvider for OpenAICompletionsProvider {
    fn api(&self) -> Api {
        Api::OpenAICompletions
    }

    async fn stream(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> Result<AssistantStream, Error> {
        let api_key = options.resolve_api_key(&model.provider).await?;
        let request = build_request(model, context, options)?;
        let body = check_payload(model, options, &request)?;

        let endpoint = format!("{}/chat/completions", model.base_url.trim_end_matches('/'));
        tracing::debug!(
            provider = %model.provider,
            model = %model.id,
            %endpoint,
            "sending chat completions request"
        );

        let builder = self
            .client
            .post(&endpoint)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&body);
        let builder = with_headers(builder, model, options);

        let signal = options.signal_or_default();
        let response = send(&model.provider, builder, &signal).await?;
        let decoder = CompletionsDecoder::new(resolve(model).thinking_format);
        Ok(drive(model.clone(), response, decoder, signal))
    }
}

/// `reasoning_effort` value for `level` on `model`.
pub(crate) fn effort(level: ThinkingLevel, model: &Model) -> &'static str {
    match level {
        ThinkingLevel::Xhigh if !supports_xhigh(model) => "high",
        other => other.as_str(),
    }
}

/// Build the Chat Completions body for `context`.
pub fn build_request(
    model: &Model,
    context: &Context,
    options: &StreamOptions,
) -> Result<ChatRequest, Error> {
    let compat = resolve(model);
    let context = prepare_context(model, context, options);
    let mut ids = ToolIdMap::new(if compat.requires_mistral_tool_ids {
        IdStyle::Mistral
    } else {
        IdStyle::Safe { max: 40 }
    });

    let mut messages = Vec::new();
    if let Some(prompt) = &context.system_prompt {
        let role = if model.reasoning && compat.supports_developer_role {
            "developer"
        } else {
            "system"
        };
        messages.push(ChatMessage::new(role, ChatContent::Text(prompt.clone())));
    }

    // Tool messages cannot carry images; they follow as one user message.
    let mut pending_images: Vec<ChatPart> = Vec::new();

    for message in &context.messages {
        if !matches!(message, Message::ToolResult(_)) {
            flush_images(&mut messages, &mut pending_images);
        }

        match message {
            Message::User(user) => {
                if compat.requires_assistant_after_tool_result
                    && messages.last().is_some_and(|m| m.role == "tool")
                {
                    messages.push(ChatMessage::new(
                        "assistant",
                        ChatContent::Text("I have processed the tool results.".to_string()),
                    ));
                }
                let content = strip_unsupported_input(model, &user.content);
                if let Some(content) = user_content(&content) {
                    messages.push(ChatMessage::new("user", content));
                }
            }
            Message::Assistant(assistant) => {
                if let Some(converted) = assistant_message(assistant, &compat, &mut ids) {
                    messages.push(converted);
                }
            }
            Message::ToolResult(result) => {
                let content = strip_unsupported_input(model, &result.content);
                let text = match collapse(&content) {
                    Collapsed::Text(text) => text,
                    Collapsed::Blocks(blocks) => {
                        let mut text = Vec::new();
                        for block in &blocks {
                            match block {
                                Content::Text(t) => text.push(t.text.clone()),
                                other => pending_images.extend(part(other)),
                            }
                        }
                        text.join("\n")
                    }
                };
                let mut tool = ChatMessage::new("tool", ChatContent::Text(text));
                tool.tool_call_id = Some(ids.normalize(&result.tool_call_id));
                if compat.requires_tool_result_name {
                    tool.name = Some(result.tool_name.clone());
                }
                messages.push(tool);
            }
            Message::Custom(_) => {}
        }
    }
    flush_images(&mut messages, &mut pending_images);

    let tools = (!context.tools.is_empty()).then(|| {
        context
            .tools
            .iter()
            .map(|tool| ChatTool {
                tool_type: "function",
                function: ChatFunction {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect()
    });

    let (max_completion_tokens, max_tokens) = match compat.max_tokens_field {
        MaxTokensField::MaxCompletionTokens => (options.max_tokens, None),
        MaxTokensField::MaxTokens => (None, options.max_tokens),
    };

    let reasoning_effort = options
        .reasoning
        .filter(|_| model.reasoning && compat.supports_reasoning_effort)
        .map(|level| effort(level, model));

    Ok(ChatRequest {
        model: model.id.clone(),
        messages,
        stream: true,
        stream_options: ChatStreamOptions {
            include_usage: true,
        },
        max_completion_tokens,
        max_tokens,
        temperature: options.temperature,
        tools,
        reasoning_effort,
        store: compat.supports_store.then_some(false),
    })
}

fn flush_images(messages: &mut Vec<ChatMessage>, pending: &mut Vec<ChatPart>) {
    if pending.is_empty() {
        return;
    }
    let mut parts = vec![ChatPart::Text {
        text: "Attached image(s) from tool result:".to_string(),
    }];
    parts.append(pending);
    messages.push(ChatMessage::new("user", ChatContent::Parts(parts)));
}

fn part(content: &Content) -> Option<ChatPart> {
    match content {
        Content::Text(text) => Some(ChatPart::Text {
            text: text.text.clone(),
        }),
        Content::Image(image) => Some(ChatPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:{};base64,{}", image.mime_type, image.data),
            },
        }),
        Content::Document(doc) => Some(ChatPart::File {
            file: FileData {
                filename: doc.file_name.clone(),
                file_data: format!("data:{};base64,{}", doc.mime_type, doc.data),
            },
        }),
        _ => None,
    }
}

fn user_content(content: &[Content]) -> Option<ChatContent> {
    match collapse(content) {
        Collapsed::Text(text) if text.trim().is_empty() => None,
        Collapsed::Text(text) => Some(ChatContent::Text(text)),
        Collapsed::Blocks(blocks) => Some(ChatContent::Parts(
            blocks.iter().filter_map(part).collect(),
        )),
    }
}

fn assistant_message(
    assistant: &AssistantMessage,
    compat: &Compat,
    ids: &mut ToolIdMap,
) -> Option<ChatMessage> {
    let mut text = Vec::new();
    let mut tool_calls = Vec::new();

    for content in &assistant.content {
        match content {
            Content::Text(t) if !t.text.trim().is_empty() => text.push(t.text.clone()),
            Content::Thinking(t)
                if compat.requires_thinking_as_text && !t.thinking.trim().is_empty() =>
            {
                text.push(t.thinking.clone());
            }
            Content::ToolCall(call) => tool_calls.push(ChatToolCall {
                id: ids.normalize(&call.id),
                call_type: "function",
                function: ChatFunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments.to_string(),
                },
            }),
            _ => {}
        }
    }

    if text.is_empty() && tool_calls.is_empty() {
        return None;
    }

    Some(ChatMessage {
        role: "assistant",
        content: (!text.is_empty()).then(|| ChatContent::Text(text.join("\n\n"))),
        name: None,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        tool_call_id: None,
    })
}

fn map_finish_reason(reason: &str) -> StopReason {
    match reason {
        "stop" => StopReason::Stop,
        "length" => StopReason::Length,
        "tool_calls" | "function_call" => StopReason::ToolUse,
        "content_filter" => StopReason::Error,
        other => unknown_stop_reason(PROVIDER, other),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Text,
    Thinking,
    Tool,
}

/// Chat Completions chunks carry no block boundaries; a block ends when a
/// delta of another kind arrives.
#[derive(Debug)]
struct CompletionsDecoder {
    current: Option<(Kind, usize)>,
    /// Vendor tool-call index to content index.
    tools: HashMap<usize, usize>,
    tags: Option<ThinkingTagParser>,
}

impl CompletionsDecoder {
    fn new(format: ThinkingFormat) -> Self {
        Self {
            current: None,
            tools: HashMap::new(),
            tags: (format == ThinkingFormat::Tags).then(ThinkingTagParser::new),
        }
    }

    fn push(
        &mut self,
        message: &mut MessageBuilder,
        text: String,
        thinking: bool,
    ) -> Result<(), Error> {
        if text.is_empty() {
            return Ok(());
        }
        let kind = if thinking { Kind::Thinking } else { Kind::Text };
        let index = match self.current {
            Some((current, index)) if current == kind => index,
            _ => {
                let index = message.next_index();
                self.current = Some((kind, index));
                index
            }
        };
        let delta = if thinking {
            ContentDelta::Thinking { text }
        } else {
            ContentDelta::Text { text }
        };
        message.apply(index, delta)
    }

    fn push_content(&mut self, message: &mut MessageBuilder, text: String) -> Result<(), Error> {
        let Some(tags) = self.tags.as_mut() else {
            return self.push(message, text, false);
        };
        for segment in tags.split(&text) {
            self.push(message, segment.text, segment.is_thinking)?;
        }
        Ok(())
    }

    fn tool_delta(
        &mut self,
        message: &mut MessageBuilder,
        delta: ToolCallDelta,
    ) -> Result<(), Error> {
        let (name, arguments) = match delta.function {
            Some(function) => (function.name, function.arguments),
            None => (None, None),
        };

        let index = match self.tools.get(&delta.index) {
            Some(&index) => index,
            None => {
                let index = message.next_index();
                let id = delta
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                message.apply(
                    index,
                    ContentDelta::ToolCallStart {
                        id,
                        name: name.unwrap_or_default(),
                    },
                )?;
                self.tools.insert(delta.index, index);
                index
            }
        };
        self.current = Some((Kind::Tool, index));

        if let Some(partial_json) = arguments.filter(|a| !a.is_empty()) {
            message.apply(index, ContentDelta::ToolCallArguments { partial_json })?;
        }
        Ok(())
    }
}

impl StreamDecoder for CompletionsDecoder {
    fn decode(&mut self, event: SseEvent, message: &mut MessageBuilder) -> Result<Flow, Error> {
        if event.is_done() {
            return Ok(Flow::Done);
        }
        if event.data.trim().is_empty() {
            return Ok(Flow::Continue);
        }

        let chunk: ChatChunk = parse_event(PROVIDER, &event)?;
        if let Some(error) = chunk.error {
            return Err(Error::provider(PROVIDER, error.message));
        }

        if let Some(usage) = chunk.usage {
            let cached = usage
                .prompt_tokens_details
                .and_then(|d| d.cached_tokens)
                .unwrap_or(0);
            let totals = message.usage_mut();
            totals.input = usage.prompt_tokens.saturating_sub(cached);
            totals.cache_read = cached;
            totals.output = usage.completion_tokens;
        }

        for choice in chunk.choices {
            if let Some(reasoning) = choice.delta.reasoning_text() {
                let reasoning = reasoning.to_string();
                self.push(message, reasoning, true)?;
            }
            if let Some(content) = choice.delta.content {
                self.push_content(message, content)?;
            }
            for call in choice.delta.tool_calls.unwrap_or_default() {
                self.tool_delta(message, call)?;
            }
            if let Some(reason) = choice.finish_reason {
                match map_finish_reason(&reason) {
                    StopReason::Error => message.set_error(format!("Model stopped: {reason}")),
                    mapped => message.set_stop_reason(mapped),
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn finish(&mut self, message: &mut MessageBuilder) -> Result<(), Error> {
        if let Some(segment) = self.tags.as_mut().and_then(ThinkingTagParser::flush) {
            self.push(message, segment.text, segment.is_thinking)?;
        }
        message.close_open_tool_calls()?;
        if message.stop_reason() == StopReason::Stop && message.has_tool_calls() {
            message.set_stop_reason(StopReason::ToolUse);
        }
        Ok(())
    }
}
