//! Anthropic Messages API.

mod types;

pub use types::*;

use reqwest::Client;
use std::collections::HashMap;

use crate::accumulator::{parse_arguments, MessageBuilder};
use crate::provider::{
    check_payload, drive, http_client, parse_event, prepare_context, send, strip_unsupported_input,
    with_headers, ApiProvider, Flow, StreamDecoder,
};
use crate::providers::shared::{collapse, unknown_stop_reason, Collapsed, IdStyle, ToolIdMap};
use crate::registry::supports_xhigh;
use crate::sse_stream::SseEvent;
use crate::types::{
    Api, AssistantMessage, CacheRetention, Content, ContentDelta, Context, Message, Model,
    StopReason, StreamOptions, ThinkingLevel, Usage,
};
use crate::{AssistantStream, Error};

const PROVIDER: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";
const TOOL_STREAMING_BETA: &str = "fine-grained-tool-streaming-2025-05-14";
const INTERLEAVED_THINKING_BETA: &str = "interleaved-thinking-2025-05-14";
const OAUTH_BETA: &str = "oauth-2025-04-20";
/// Output cap when the caller does not ask for one.
const DEFAULT_MAX_TOKENS: u64 = 32_000;
/// Room left for the visible answer when thinking shares the budget.
const MIN_ANSWER_TOKENS: u64 = 1024;

/// Anthropic Messages provider.
pub struct AnthropicProvider {
    client: Client,
}

impl AnthropicProvider {
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
impl ApiProvider for AnthropicProvider {
    fn api(&self) -> Api {
        Api::AnthropicMessages
    }

    async fn stream(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> Result<AssistantStream, Error> {
        let api_key = options.resolve_api_key(&model.provider).await?;
        let request = build_request(model, context, options)?;
        let thinking = request.thinking.is_some();
        let body = check_payload(model, options, &request)?;

        let endpoint = format!("{}/v1/messages", model.base_url.trim_end_matches('/'));
        tracing::debug!(
            provider = %model.provider,
            model = %model.id,
            %endpoint,
            "sending messages request"
        );

        let mut betas = vec![TOOL_STREAMING_BETA];
        if thinking {
            betas.push(INTERLEAVED_THINKING_BETA);
        }
        let mut builder = self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .header("anthropic-version", API_VERSION)
            .json(&body);
        // Claude subscription tokens authenticate as OAuth bearers.
        builder = if api_key.starts_with("sk-ant-oat") {
            betas.insert(0, OAUTH_BETA);
            builder.header("Authorization", format!("Bearer {api_key}"))
        } else {
            builder.header("x-api-key", api_key)
        };
        builder = builder.header("anthropic-beta", betas.join(","));
        let builder = with_headers(builder, model, options);

        let signal = options.signal_or_default();
        let response = send(PROVIDER, builder, &signal).await?;
        Ok(drive(model.clone(), response, AnthropicDecoder::default(), signal))
    }
}

/// Build the Messages API body for `context`.
pub fn build_request(
    model: &Model,
    context: &Context,
    options: &StreamOptions,
) -> Result<MessagesRequest, Error> {
    let context = prepare_context(model, context, options);
    let cache = cache_control(options.cache_retention);
    let mut ids = ToolIdMap::new(IdStyle::Safe { max: 64 });
    let mut messages: Vec<AnthropicMessage> = Vec::new();

    for message in &context.messages {
        match message {
            Message::User(user) => {
                let content = strip_unsupported_input(model, &user.content);
                if let Some(content) = convert_content(&content) {
                    messages.push(AnthropicMessage {
                        role: "user",
                        content,
                    });
                }
            }
            Message::Assistant(assistant) => {
                let blocks = assistant_blocks(assistant, &mut ids);
                if !blocks.is_empty() {
                    messages.push(AnthropicMessage {
                        role: "assistant",
                        content: AnthropicContent::Blocks(blocks),
                    });
                }
            }
            Message::ToolResult(result) => {
                let content = strip_unsupported_input(model, &result.content);
                let block = AnthropicBlock::ToolResult {
                    tool_use_id: ids.normalize(&result.tool_call_id),
                    content: convert_content(&content)
                        .unwrap_or_else(|| AnthropicContent::Text(String::new())),
                    is_error: result.is_error,
                    cache_control: None,
                };
                // Results answering one turn travel in a single user message.
                if carries_tool_results(messages.last()) {
                    if let Some(AnthropicMessage {
                        content: AnthropicContent::Blocks(blocks),
                        ..
                    }) = messages.last_mut()
                    {
                        blocks.push(block);
                    }
                } else {
                    messages.push(AnthropicMessage {
                        role: "user",
                        content: AnthropicContent::Blocks(vec![block]),
                    });
                }
            }
            Message::Custom(_) => {}
        }
    }

    if let Some(control) = &cache {
        mark_last_user_message(&mut messages, control.clone());
    }

    let system = context.system_prompt.as_ref().map(|prompt| {
        vec![AnthropicBlock::Text {
            text: prompt.clone(),
            cache_control: cache.clone(),
        }]
    });

    let tools = (!context.tools.is_empty()).then(|| {
        context
            .tools
            .iter()
            .map(|tool| AnthropicTool {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.parameters.clone(),
            })
            .collect()
    });

    let requested = options
        .max_tokens
        .unwrap_or_else(|| model.max_tokens.min(DEFAULT_MAX_TOKENS));
    let (max_tokens, thinking) = match options.reasoning.filter(|_| model.reasoning) {
        Some(level) => {
            let level = if level == ThinkingLevel::Xhigh && !supports_xhigh(model) {
                ThinkingLevel::High
            } else {
                level
            };
            let budget = options.thinking_budgets.for_level(level);
            let max_tokens = model.max_tokens.min(requested + budget);
            let budget = budget.min(max_tokens.saturating_sub(MIN_ANSWER_TOKENS));
            if budget >= 1024 {
                (
                    max_tokens,
                    Some(ThinkingConfig {
                        thinking_type: "enabled",
                        budget_tokens: budget,
                    }),
                )
            } else {
                (max_tokens, None)
            }
        }
        None => (requested.min(model.max_tokens), None),
    };

    Ok(MessagesRequest {
        model: model.id.clone(),
        messages,
        max_tokens,
        stream: true,
        system,
        // Extended thinking rejects a custom temperature.
        temperature: if thinking.is_some() {
            None
        } else {
            options.temperature
        },
        tools,
        thinking,
    })
}

fn cache_control(retention: CacheRetention) -> Option<CacheControl> {
    match retention {
        CacheRetention::None => None,
        CacheRetention::Short => Some(CacheControl {
            control_type: "ephemeral",
            ttl: None,
        }),
        CacheRetention::Long => Some(CacheControl {
            control_type: "ephemeral",
            ttl: Some("1h"),
        }),
    }
}

fn carries_tool_results(message: Option<&AnthropicMessage>) -> bool {
    match message {
        Some(AnthropicMessage {
            role: "user",
            content: AnthropicContent::Blocks(blocks),
        }) => blocks
            .iter()
            .any(|b| matches!(b, AnthropicBlock::ToolResult { .. })),
        _ => false,
    }
}

fn mark_last_user_message(messages: &mut [AnthropicMessage], control: CacheControl) {
    let Some(last_user) = messages.iter_mut().rev().find(|m| m.role == "user") else {
        return;
    };
    if let AnthropicContent::Text(text) = &last_user.content {
        let text = text.clone();
        last_user.content = AnthropicContent::Blocks(vec![AnthropicBlock::Text {
            text,
            cache_control: Some(control),
        }]);
    } else if let AnthropicContent::Blocks(blocks) = &mut last_user.content {
        if let Some(block) = blocks.last_mut() {
            block.set_cache_control(control);
        }
    }
}

/// User or tool-result content; `None` when nothing sendable is left.
fn convert_content(content: &[Content]) -> Option<AnthropicContent> {
    match collapse(content) {
        Collapsed::Text(text) if text.trim().is_empty() => None,
        Collapsed::Text(text) => Some(AnthropicContent::Text(text)),
        Collapsed::Blocks(blocks) => Some(AnthropicContent::Blocks(
            blocks.iter().filter_map(input_block).collect(),
        )),
    }
}

fn input_block(content: &Content) -> Option<AnthropicBlock> {
    match content {
        Content::Text(text) if !text.text.trim().is_empty() => {
            Some(AnthropicBlock::text(text.text.clone()))
        }
        Content::Image(image) => Some(AnthropicBlock::Image {
            source: Base64Source::new(&image.mime_type, &image.data),
        }),
        Content::Document(doc) => Some(AnthropicBlock::Document {
            source: Base64Source::new(&doc.mime_type, &doc.data),
            title: Some(doc.file_name.clone()),
        }),
        _ => None,
    }
}

fn assistant_blocks(assistant: &AssistantMessage, ids: &mut ToolIdMap) -> Vec<AnthropicBlock> {
    let mut blocks = Vec::new();
    for content in &assistant.content {
        match content {
            Content::Text(text) if !text.text.trim().is_empty() => {
                blocks.push(AnthropicBlock::text(text.text.clone()));
            }
            Content::Thinking(thinking) => match &thinking.signature {
                Some(signature) if thinking.redacted => {
                    blocks.push(AnthropicBlock::RedactedThinking {
                        data: signature.clone(),
                    });
                }
                Some(signature) if !signature.is_empty() => {
                    blocks.push(AnthropicBlock::Thinking {
                        thinking: thinking.thinking.clone(),
                        signature: signature.clone(),
                    });
                }
                // Unsigned reasoning cannot be replayed as thinking.
                _ if !thinking.thinking.trim().is_empty() => {
                    blocks.push(AnthropicBlock::text(thinking.thinking.clone()));
                }
                _ => {}
            },
            Content::ToolCall(call) => blocks.push(AnthropicBlock::ToolUse {
                id: ids.normalize(&call.id),
                name: call.name.clone(),
                input: call.arguments.clone(),
            }),
            _ => {}
        }
    }
    blocks
}

fn map_stop_reason(reason: &str) -> StopReason {
    match reason {
        "end_turn" | "stop_sequence" | "pause_turn" => StopReason::Stop,
        "max_tokens" => StopReason::Length,
        "tool_use" => StopReason::ToolUse,
        "refusal" | "sensitive" => StopReason::Error,
        other => unknown_stop_reason(PROVIDER, other),
    }
}

fn apply_usage(usage: &mut Usage, reported: &AnthropicUsage) {
    if let Some(input) = reported.input_tokens {
        usage.input = input;
    }
    if let Some(output) = reported.output_tokens {
        usage.output = output;
    }
    if let Some(cache_write) = reported.cache_creation_input_tokens {
        usage.cache_write = cache_write;
    }
    if let Some(cache_read) = reported.cache_read_input_tokens {
        usage.cache_read = cache_read;
    }
}

/// Maps Anthropic block indices onto message content indices.
#[derive(Debug, Default)]
struct AnthropicDecoder {
    blocks: HashMap<usize, usize>,
}

impl StreamDecoder for AnthropicDecoder {
    fn decode(&mut self, event: SseEvent, message: &mut MessageBuilder) -> Result<Flow, Error> {
        if event.data.trim().is_empty() {
            return Ok(Flow::Continue);
        }

        match parse_event::<AnthropicStreamEvent>(PROVIDER, &event)? {
            AnthropicStreamEvent::MessageStart { message: started } => {
                apply_usage(message.usage_mut(), &started.usage);
            }
            AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                let at = message.next_index();
                match content_block {
                    StreamBlock::Text { text } => {
                        message.apply(at, ContentDelta::Text { text })?;
                    }
                    StreamBlock::Thinking {
                        thinking,
                        signature,
                    } => {
                        message.apply(at, ContentDelta::Thinking { text: thinking })?;
                        if let Some(signature) = signature.filter(|s| !s.is_empty()) {
                            message.apply(at, ContentDelta::ThinkingSignature { signature })?;
                        }
                    }
                    StreamBlock::RedactedThinking { data } => {
                        message.apply(at, ContentDelta::ThinkingSignature { signature: data })?;
                        message.mark_redacted(at);
                    }
                    StreamBlock::ToolUse { id, name, input } => {
                        message.apply(at, ContentDelta::ToolCallStart { id, name })?;
                        if input.as_object().is_some_and(|o| !o.is_empty()) {
                            message.apply(
                                at,
                                ContentDelta::ToolCallArguments {
                                    partial_json: input.to_string(),
                                },
                            )?;
                        }
                    }
                    StreamBlock::Unknown => {
                        tracing::debug!(index, "skipping unsupported content block");
                        return Ok(Flow::Continue);
                    }
                }
                self.blocks.insert(index, at);
            }
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => {
                let Some(&at) = self.blocks.get(&index) else {
                    return Ok(Flow::Continue);
                };
                let delta = match delta {
                    AnthropicContentDelta::TextDelta { text } => ContentDelta::Text { text },
                    AnthropicContentDelta::ThinkingDelta { thinking } => {
                        ContentDelta::Thinking { text: thinking }
                    }
                    AnthropicContentDelta::SignatureDelta { signature } => {
                        ContentDelta::ThinkingSignature { signature }
                    }
                    AnthropicContentDelta::InputJsonDelta { partial_json } => {
                        ContentDelta::ToolCallArguments { partial_json }
                    }
                    AnthropicContentDelta::Unknown => return Ok(Flow::Continue),
                };
                message.apply(at, delta)?;
            }
            AnthropicStreamEvent::ContentBlockStop { index } => {
                if let Some(at) = self.blocks.remove(&index) {
                    let arguments = message.partial_arguments(at).map(parse_arguments);
                    if let Some(arguments) = arguments {
                        message.apply(
                            at,
                            ContentDelta::ToolCallEnd {
                                arguments,
                                thought_signature: None,
                            },
                        )?;
                    }
                }
            }
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason {
                    match map_stop_reason(&reason) {
                        StopReason::Error => message.set_error(format!("Model stopped: {reason}")),
                        mapped => message.set_stop_reason(mapped),
                    }
                }
                if let Some(usage) = usage {
                    apply_usage(message.usage_mut(), &usage);
                }
            }
            AnthropicStreamEvent::MessageStop => return Ok(Flow::Done),
            AnthropicStreamEvent::Ping => {}
            AnthropicStreamEvent::Error { error } => {
                return Err(Error::provider(
                    PROVIDER,
                    format!("{}: {}", error.error_type, error.message),
                ));
            }
        }
        Ok(Flow::Continue)
    }
}
