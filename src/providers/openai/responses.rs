//! OpenAI Responses API.
//!
//! The input conversion and the stream decoder are shared with the Codex
//! provider, which speaks the same protocol with a different envelope.

use reqwest::Client;
use std::collections::HashMap;

use super::reasoning::{resolve_effort, Effort};
use super::responses_types::*;
use crate::accumulator::{parse_arguments, MessageBuilder};
use crate::provider::{
    check_payload, drive, http_client, parse_event, prepare_context, send, strip_unsupported_input,
    with_headers, ApiProvider, Flow, StreamDecoder,
};
use crate::providers::shared::{collapse, unknown_stop_reason, Collapsed, IdStyle, ToolIdMap};
use crate::sse_stream::SseEvent;
use crate::types::{
    Api, AssistantMessage, Content, ContentDelta, Context, Message, Model, StopReason,
    StreamOptions,
};
use crate::{AssistantStream, Error};

const PROVIDER: &str = "openai-responses";

/// Responses API provider.
pub struct OpenAIResponsesProvider {
    client: Client,
}

impl OpenAIResponsesProvider {
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
impl ApiProvider for OpenAIResponsesProvider {
    fn api(&self) -> Api {
        Api::OpenAIResponses
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

        let endpoint = format!("{}/responses", model.base_url.trim_end_matches('/'));
        tracing::debug!(
            provider = %model.provider,
            model = %model.id,
            %endpoint,
            "sending responses request"
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
        Ok(drive(model.clone(), response, ResponsesDecoder::new(PROVIDER), signal))
    }
}

/// Build the Responses body for `context`.
///
/// Reasoning models always carry a reasoning config; an unset level means
/// the lowest tier the family accepts.
pub fn build_request(
    model: &Model,
    context: &Context,
    options: &StreamOptions,
) -> Result<ResponsesRequest, Error> {
    let context = prepare_context(model, context, options);

    let mut input = Vec::new();
    if let Some(prompt) = &context.system_prompt {
        let role = if model.reasoning { "developer" } else { "system" };
        input.push(InputItem::message(role, MessageContent::Text(prompt.clone())));
    }
    input.extend(input_items(model, &context));

    let reasoning = model.reasoning.then(|| ReasoningConfig {
        effort: resolve_effort(
            &model.id,
            Some(options.reasoning.map_or(Effort::None, Effort::from)),
        ),
        summary: "auto",
    });

    Ok(ResponsesRequest {
        model: model.id.clone(),
        instructions: None,
        input,
        stream: true,
        store: false,
        max_output_tokens: options.max_tokens,
        temperature: options.temperature,
        tools: tools(&context),
        tool_choice: None,
        parallel_tool_calls: None,
        reasoning,
        include: if model.reasoning {
            vec!["reasoning.encrypted_content"]
        } else {
            Vec::new()
        },
        prompt_cache_key: options.session_id.clone(),
    })
}

/// Function tools in Responses shape.
pub(crate) fn tools(context: &Context) -> Option<Vec<ResponsesTool>> {
    (!context.tools.is_empty()).then(|| {
        context
            .tools
            .iter()
            .map(|tool| ResponsesTool {
                tool_type: "function",
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
                strict: None,
            })
            .collect()
    })
}

/// Conversation history as `input` items. The system prompt is left to the caller.
pub(crate) fn input_items(model: &Model, context: &Context) -> Vec<InputItem> {
    let mut ids = ToolIdMap::new(IdStyle::Safe { max: 64 });
    let mut items = Vec::new();
    let mut pending_images: Vec<InputPart> = Vec::new();

    for message in &context.messages {
        if !matches!(message, Message::ToolResult(_)) {
            flush_images(&mut items, &mut pending_images);
        }

        match message {
            Message::User(user) => {
                let content = strip_unsupported_input(model, &user.content);
                if let Some(content) = user_content(&content) {
                    items.push(InputItem::message("user", content));
                }
            }
            Message::Assistant(assistant) => assistant_items(assistant, &mut ids, &mut items),
            Message::ToolResult(result) => {
                let content = strip_unsupported_input(model, &result.content);
                let output = match collapse(&content) {
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
                items.push(InputItem::FunctionCallOutput {
                    call_id: ids.normalize(&result.tool_call_id),
                    output,
                });
            }
            Message::Custom(_) => {}
        }
    }
    flush_images(&mut items, &mut pending_images);
    items
}

fn flush_images(items: &mut Vec<InputItem>, pending: &mut Vec<InputPart>) {
    if pending.is_empty() {
        return;
    }
    let mut parts = vec![InputPart::InputText {
        text: "Attached image(s) from tool result:".to_string(),
    }];
    parts.append(pending);
    items.push(InputItem::message("user", MessageContent::Parts(parts)));
}

fn part(content: &Content) -> Option<InputPart> {
    match content {
        Content::Text(text) => Some(InputPart::InputText {
            text: text.text.clone(),
        }),
        Content::Image(image) => Some(InputPart::InputImage {
            image_url: format!("data:{};base64,{}", image.mime_type, image.data),
            detail: "auto",
        }),
        Content::Document(doc) => Some(InputPart::InputFile {
            filename: doc.file_name.clone(),
            file_data: format!("data:{};base64,{}", doc.mime_type, doc.data),
        }),
        _ => None,
    }
}

fn user_content(content: &[Content]) -> Option<MessageContent> {
    match collapse(content) {
        Collapsed::Text(text) if text.trim().is_empty() => None,
        Collapsed::Text(text) => Some(MessageContent::Text(text)),
        Collapsed::Blocks(blocks) => Some(MessageContent::Parts(
            blocks.iter().filter_map(part).collect(),
        )),
    }
}

fn assistant_items(assistant: &AssistantMessage, ids: &mut ToolIdMap, items: &mut Vec<InputItem>) {
    for content in &assistant.content {
        match content {
            // Only signed reasoning can be replayed; the signature is the item itself.
            Content::Thinking(thinking) => {
                let Some(signature) = &thinking.signature else {
                    continue;
                };
                match serde_json::from_str::<ReasoningItem>(signature) {
                    Ok(item) => items.push(InputItem::Reasoning(item)),
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping unreadable reasoning signature")
                    }
                }
            }
            Content::Text(text) if !text.text.trim().is_empty() => {
                items.push(InputItem::message(
                    "assistant",
                    MessageContent::Text(text.text.clone()),
                ));
            }
            Content::ToolCall(call) => items.push(InputItem::FunctionCall {
                call_id: ids.normalize(&call.id),
                name: call.name.clone(),
                arguments: call.arguments.to_string(),
            }),
            _ => {}
        }
    }
}

fn map_status(provider: &str, status: &str) -> StopReason {
    match status {
        "completed" | "in_progress" | "queued" => StopReason::Stop,
        "incomplete" => StopReason::Length,
        "failed" | "cancelled" => StopReason::Error,
        other => unknown_stop_reason(provider, other),
    }
}

/// Responses streams announce every output item, so each item maps to one
/// content block, opened on its first delta.
#[derive(Debug)]
pub(crate) struct ResponsesDecoder {
    provider: &'static str,
    /// Vendor `output_index` to content index.
    items: HashMap<usize, usize>,
}

impl ResponsesDecoder {
    pub(crate) fn new(provider: &'static str) -> Self {
        Self {
            provider,
            items: HashMap::new(),
        }
    }

    fn index_for(&mut self, output_index: usize, message: &MessageBuilder) -> usize {
        *self
            .items
            .entry(output_index)
            .or_insert_with(|| message.next_index())
    }

    fn thinking(
        &mut self,
        output_index: usize,
        text: String,
        message: &mut MessageBuilder,
    ) -> Result<(), Error> {
        if text.is_empty() {
            return Ok(());
        }
        let index = self.index_for(output_index, message);
        message.apply(index, ContentDelta::Thinking { text })
    }

    fn text(
        &mut self,
        output_index: usize,
        text: String,
        message: &mut MessageBuilder,
    ) -> Result<(), Error> {
        if text.is_empty() {
            return Ok(());
        }
        let index = self.index_for(output_index, message);
        message.apply(index, ContentDelta::Text { text })
    }

    fn item_added(
        &mut self,
        output_index: usize,
        item: OutputItem,
        message: &mut MessageBuilder,
    ) -> Result<(), Error> {
        if let OutputItem::FunctionCall { call_id, name, arguments } = item {
            let index = message.next_index();
            message.apply(index, ContentDelta::ToolCallStart { id: call_id, name })?;
            self.items.insert(output_index, index);
            if !arguments.is_empty() {
                message.apply(
                    index,
                    ContentDelta::ToolCallArguments {
                        partial_json: arguments,
                    },
                )?;
            }
        }
        Ok(())
    }

    fn item_done(
        &mut self,
        output_index: usize,
        item: OutputItem,
        message: &mut MessageBuilder,
    ) -> Result<(), Error> {
        match item {
            OutputItem::Reasoning(reasoning) => {
                if !self.items.contains_key(&output_index) {
                    let summary: Vec<&str> =
                        reasoning.summary.iter().map(|s| s.text.as_str()).collect();
                    self.thinking(output_index, summary.join("\n\n"), message)?;
                }
                let signature = serde_json::to_string(&reasoning)?;
                let index = self.index_for(output_index, message);
                message.apply(index, ContentDelta::ThinkingSignature { signature })?;
            }
            OutputItem::FunctionCall { arguments, .. } => {
                let Some(&index) = self.items.get(&output_index) else {
                    return Ok(());
                };
                let Some(partial) = message.partial_arguments(index) else {
                    return Ok(());
                };
                if partial.is_empty() && !arguments.is_empty() {
                    message.apply(
                        index,
                        ContentDelta::ToolCallArguments {
                            partial_json: arguments,
                        },
                    )?;
                }
                let arguments =
                    parse_arguments(message.partial_arguments(index).unwrap_or_default());
                message.apply(
                    index,
                    ContentDelta::ToolCallEnd {
                        arguments,
                        thought_signature: None,
                    },
                )?;
            }
            OutputItem::Message { .. } | OutputItem::Other => {}
        }
        Ok(())
    }

    fn terminal(&mut self, response: ResponseBody, message: &mut MessageBuilder) {
        if let Some(usage) = response.usage {
            let cached = usage.input_tokens_details.map_or(0, |d| d.cached_tokens);
            let totals = message.usage_mut();
            totals.input = usage.input_tokens.saturating_sub(cached);
            totals.cache_read = cached;
            totals.output = usage.output_tokens;
        }

        let status = response.status.as_deref().unwrap_or("completed");
        match map_status(self.provider, status) {
            StopReason::Error => {
                let detail = response
                    .error
                    .map(|e| e.message)
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| format!("Response {status}"));
                message.set_error(detail);
            }
            StopReason::Length => {
                if let Some(reason) = response.incomplete_details.and_then(|d| d.reason) {
                    tracing::debug!(provider = self.provider, %reason, "response incomplete");
                }
                message.set_stop_reason(StopReason::Length);
            }
            mapped => message.set_stop_reason(mapped),
        }
    }
}

impl StreamDecoder for ResponsesDecoder {
    fn decode(&mut self, event: SseEvent, message: &mut MessageBuilder) -> Result<Flow, Error> {
        if event.is_done() {
            return Ok(Flow::Done);
        }
        if event.data.trim().is_empty() {
            return Ok(Flow::Continue);
        }

        match parse_event::<ResponsesEvent>(self.provider, &event)? {
            ResponsesEvent::OutputItemAdded { output_index, item } => {
                self.item_added(output_index, item, message)?;
            }
            ResponsesEvent::OutputItemDone { output_index, item } => {
                self.item_done(output_index, item, message)?;
            }
            ResponsesEvent::OutputTextDelta { output_index, delta }
            | ResponsesEvent::RefusalDelta { output_index, delta } => {
                self.text(output_index, delta, message)?;
            }
            ResponsesEvent::ReasoningSummaryTextDelta { output_index, delta }
            | ResponsesEvent::ReasoningTextDelta { output_index, delta } => {
                self.thinking(output_index, delta, message)?;
            }
            ResponsesEvent::ReasoningSummaryPartAdded { output_index } => {
                // Separate summary parts once the first one has text.
                if let Some(&index) = self.items.get(&output_index) {
                    let started = matches!(
                        message.message().content.get(index),
                        Some(Content::Thinking(t)) if !t.thinking.is_empty()
                    );
                    if started {
                        message.apply(
                            index,
                            ContentDelta::Thinking {
                                text: "\n\n".to_string(),
                            },
                        )?;
                    }
                }
            }
            ResponsesEvent::FunctionCallArgumentsDelta { output_index, delta } => {
                if let Some(&index) = self.items.get(&output_index) {
                    if !delta.is_empty() {
                        message.apply(
                            index,
                            ContentDelta::ToolCallArguments {
                                partial_json: delta,
                            },
                        )?;
                    }
                }
            }
            ResponsesEvent::Completed { response }
            | ResponsesEvent::Incomplete { response }
            | ResponsesEvent::Failed { response } => {
                self.terminal(response, message);
                return Ok(Flow::Done);
            }
            ResponsesEvent::Error {
                code,
                message: text,
            } => {
                let text = match code {
                    Some(code) => format!("{code}: {text}"),
                    None => text,
                };
                return Err(Error::provider(self.provider, text));
            }
            ResponsesEvent::Other => {}
        }
        Ok(Flow::Continue)
    }

    fn finish(&mut self, message: &mut MessageBuilder) -> Result<(), Error> {
        message.close_open_tool_calls()?;
        if message.stop_reason() == StopReason::Stop && message.has_tool_calls() {
            message.set_stop_reason(StopReason::ToolUse);
        }
        Ok(())
    }
}
