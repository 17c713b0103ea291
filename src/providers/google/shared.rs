//! Conversion and decoding shared by the Generative AI, Vertex and Cloud
//! Code Assist surfaces, which all speak the `generateContent` format.

use ijson::IValue;
use serde_json::json;

use super::types::*;
use crate::accumulator::MessageBuilder;
use crate::provider::{parse_event, strip_unsupported_input, Flow, StreamDecoder};
use crate::providers::shared::{collapse, unknown_stop_reason, Collapsed, IdStyle, ToolIdMap};
use crate::sse_stream::SseEvent;
use crate::thinking::is_thinking_part;
use crate::types::{
    AssistantMessage, Content, ContentDelta, Context, Message, Model, StopReason, StreamOptions,
    ThinkingLevel,
};
use crate::Error;

/// Accepted in place of a real signature on Gemini 3 function calls that
/// were not produced with one.
pub const SKIP_SIGNATURE: &str = "skip_thought_signature_validator";

fn is_gemini_3(model: &Model) -> bool {
    model.id.contains("gemini-3")
}

/// Claude models behind Cloud Code Assist match calls to results by id.
fn needs_tool_ids(model: &Model) -> bool {
    model.id.starts_with("claude-")
}

/// Build the `generateContent` body. `context` must already be prepared.
pub(crate) fn build_generate_request(
    model: &Model,
    context: &Context,
    options: &StreamOptions,
) -> Result<GenerateRequest, Error> {
    let contents = convert_messages(model, context)?;

    let system_instruction = context.system_prompt.as_ref().map(|prompt| SystemInstruction {
        role: None,
        parts: vec![GooglePart::text(prompt.clone())],
    });

    let tools = if context.tools.is_empty() {
        None
    } else {
        let mut declarations = Vec::with_capacity(context.tools.len());
        for tool in &context.tools {
            declarations.push(GoogleFunctionDeclaration {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: serde_json::value::to_raw_value(&tool.parameters)?,
            });
        }
        Some(vec![GoogleTool {
            function_declarations: declarations,
        }])
    };

    Ok(GenerateRequest {
        contents,
        system_instruction,
        generation_config: Some(GenerationConfig {
            temperature: options.temperature,
            max_output_tokens: options.max_tokens,
            thinking_config: thinking_config(model, options),
        }),
        tools,
        session_id: None,
    })
}

/// Reasoning settings for `model`.
///
/// Gemini 3 takes a named level (Pro only `LOW`/`HIGH`); older models take a
/// token budget. With reasoning off, models that cannot disable it get their
/// lowest setting.
pub(crate) fn thinking_config(model: &Model, options: &StreamOptions) -> Option<ThinkingConfig> {
    if !model.reasoning {
        return None;
    }
    let id = model.id.as_str();
    let flash = id.contains("flash");

    if is_gemini_3(model) {
        let level = match options.reasoning {
            None | Some(ThinkingLevel::Minimal) if flash => "MINIMAL",
            None | Some(ThinkingLevel::Minimal) | Some(ThinkingLevel::Low) => "LOW",
            Some(ThinkingLevel::Medium) if flash => "MEDIUM",
            Some(ThinkingLevel::Medium | ThinkingLevel::High | ThinkingLevel::Xhigh) => "HIGH",
        };
        return Some(ThinkingConfig {
            include_thoughts: options.reasoning.is_some(),
            thinking_level: Some(level),
            thinking_budget: None,
        });
    }

    match options.reasoning {
        Some(level) => {
            let cap = if flash { 24_576 } else { 32_768 };
            Some(ThinkingConfig {
                include_thoughts: true,
                thinking_level: None,
                thinking_budget: Some(options.thinking_budgets.for_level(level).min(cap)),
            })
        }
        None if flash => Some(ThinkingConfig {
            include_thoughts: false,
            thinking_level: None,
            thinking_budget: Some(0),
        }),
        None => None,
    }
}

fn to_ivalue(value: serde_json::Value) -> Result<IValue, Error> {
    Ok(serde_json::from_value(value)?)
}

fn parts_for(content: &[Content]) -> Vec<GooglePart> {
    match collapse(content) {
        Collapsed::Text(text) if text.trim().is_empty() => Vec::new(),
        Collapsed::Text(text) => vec![GooglePart::text(text)],
        Collapsed::Blocks(blocks) => blocks.iter().filter_map(part).collect(),
    }
}

fn part(content: &Content) -> Option<GooglePart> {
    match content {
        Content::Text(text) => Some(GooglePart::text(text.text.clone())),
        Content::Image(image) => Some(GooglePart::inline(&image.mime_type, &image.data)),
        Content::Document(doc) => Some(GooglePart::inline(&doc.mime_type, &doc.data)),
        _ => None,
    }
}

fn convert_messages(model: &Model, context: &Context) -> Result<Vec<GoogleContent>, Error> {
    let mut ids = ToolIdMap::new(IdStyle::Safe { max: 64 });
    let tool_ids = needs_tool_ids(model);
    let mut contents: Vec<GoogleContent> = Vec::new();

    for message in &context.messages {
        match message {
            Message::User(user) => {
                let parts = parts_for(&strip_unsupported_input(model, &user.content));
                if !parts.is_empty() {
                    contents.push(GoogleContent {
                        role: "user".to_string(),
                        parts,
                    });
                }
            }
            Message::Assistant(assistant) => {
                let parts = model_parts(assistant, model, &mut ids, tool_ids)?;
                if !parts.is_empty() {
                    contents.push(GoogleContent {
                        role: "model".to_string(),
                        parts,
                    });
                }
            }
            Message::ToolResult(result) => {
                let content = strip_unsupported_input(model, &result.content);
                let (text, media) = match collapse(&content) {
                    Collapsed::Text(text) => (text, Vec::new()),
                    Collapsed::Blocks(blocks) => {
                        let text: Vec<&str> = blocks.iter().filter_map(Content::as_text).collect();
                        let media: Vec<GooglePart> = blocks
                            .iter()
                            .filter(|b| b.as_text().is_none())
                            .filter_map(part)
                            .collect();
                        (text.join("\n"), media)
                    }
                };
                let response = if result.is_error {
                    json!({ "error": text })
                } else {
                    json!({ "output": text })
                };
                let response_part = GooglePart {
                    function_response: Some(GoogleFunctionResponse {
                        name: result.tool_name.clone(),
                        response: to_ivalue(response)?,
                        id: tool_ids.then(|| ids.normalize(&result.tool_call_id)),
                    }),
                    ..GooglePart::default()
                };

                // All responses to one model turn travel in a single user turn.
                let joins_previous = contents.last().is_some_and(|last| {
                    last.role == "user" && last.parts.iter().any(|p| p.function_response.is_some())
                });
                if !joins_previous {
                    contents.push(GoogleContent {
                        role: "user".to_string(),
                        parts: Vec::new(),
                    });
                }
                if let Some(turn) = contents.last_mut() {
                    turn.parts.push(response_part);
                    turn.parts.extend(media);
                }
            }
            Message::Custom(_) => {}
        }
    }
    Ok(contents)
}

fn model_parts(
    assistant: &AssistantMessage,
    model: &Model,
    ids: &mut ToolIdMap,
    tool_ids: bool,
) -> Result<Vec<GooglePart>, Error> {
    let mut parts = Vec::new();
    for content in &assistant.content {
        match content {
            Content::Thinking(thinking) => {
                let empty = thinking.thinking.is_empty() && thinking.signature.is_none();
                if thinking.redacted || empty {
                    continue;
                }
                parts.push(GooglePart {
                    text: Some(thinking.thinking.clone()),
                    thought: true,
                    thought_signature: thinking.signature.clone(),
                    ..GooglePart::default()
                });
            }
            Content::Text(text) => {
                if text.text.trim().is_empty() {
                    continue;
                }
                parts.push(GooglePart {
                    text: Some(text.text.clone()),
                    thought_signature: text.signature.clone(),
                    ..GooglePart::default()
                });
            }
            Content::ToolCall(call) => {
                let signature = call
                    .thought_signature
                    .clone()
                    .or_else(|| is_gemini_3(model).then(|| SKIP_SIGNATURE.to_string()));
                parts.push(GooglePart {
                    function_call: Some(GoogleFunctionCall {
                        name: call.name.clone(),
                        args: to_ivalue(call.arguments.clone())?,
                        id: tool_ids.then(|| ids.normalize(&call.id)),
                    }),
                    thought_signature: signature,
                    ..GooglePart::default()
                });
            }
            Content::Image(_) | Content::Document(_) => {}
        }
    }
    Ok(parts)
}

fn map_finish_reason(provider: &str, reason: &str) -> StopReason {
    match reason {
        "STOP" => StopReason::Stop,
        "MAX_TOKENS" => StopReason::Length,
        "SAFETY" | "RECITATION" | "LANGUAGE" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII"
        | "MALFORMED_FUNCTION_CALL" | "IMAGE_SAFETY" | "UNEXPECTED_TOOL_CALL" | "OTHER" => {
            StopReason::Error
        }
        other => unknown_stop_reason(provider, other),
    }
}

/// Google streams whole parts. Adjacent parts of the same kind share a block;
/// function calls arrive complete.
#[derive(Debug)]
pub(crate) struct GoogleDecoder {
    provider: &'static str,
    /// Chunks are wrapped as `{"response": ...}` (Cloud Code Assist).
    envelope: bool,
    /// Whether the open block is thinking, and its index.
    current: Option<(bool, usize)>,
}

impl GoogleDecoder {
    pub(crate) fn new(provider: &'static str) -> Self {
        Self {
            provider,
            envelope: false,
            current: None,
        }
    }

    pub(crate) fn enveloped(provider: &'static str) -> Self {
        Self {
            envelope: true,
            ..Self::new(provider)
        }
    }

    fn part(&mut self, part: GooglePart, message: &mut MessageBuilder) -> Result<(), Error> {
        if let Some(call) = part.function_call {
            self.current = None;
            let index = message.next_index();
            let id = call
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("{}_{}", call.name, uuid::Uuid::new_v4().simple()));
            let arguments = serde_json::to_value(&call.args)?;
            message.apply(
                index,
                ContentDelta::ToolCallStart {
                    id,
                    name: call.name,
                },
            )?;
            message.apply(
                index,
                ContentDelta::ToolCallArguments {
                    partial_json: arguments.to_string(),
                },
            )?;
            message.apply(
                index,
                ContentDelta::ToolCallEnd {
                    arguments,
                    thought_signature: part.thought_signature,
                },
            )?;
            return Ok(());
        }

        let Some(text) = part.text else {
            return Ok(());
        };
        let signature = part.thought_signature.filter(|s| !s.is_empty());
        let thinking = is_thinking_part(part.thought, &text, signature.as_deref());

        let (index, opened) = match self.current {
            Some((kind, index)) if kind == thinking => (index, false),
            _ => {
                if text.is_empty() && signature.is_none() {
                    return Ok(());
                }
                let index = message.next_index();
                self.current = Some((thinking, index));
                (index, true)
            }
        };

        if opened || !text.is_empty() {
            let delta = if thinking {
                ContentDelta::Thinking { text }
            } else {
                ContentDelta::Text { text }
            };
            message.apply(index, delta)?;
        }
        if let Some(signature) = signature {
            message.apply(index, ContentDelta::ThinkingSignature { signature })?;
        }
        Ok(())
    }

    fn chunk(
        &mut self,
        response: GenerateResponse,
        message: &mut MessageBuilder,
    ) -> Result<(), Error> {
        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            message.set_error(format!("Prompt blocked: {reason}"));
        }

        if let Some(usage) = response.usage_metadata {
            let totals = message.usage_mut();
            totals.input = usage
                .prompt_token_count
                .saturating_sub(usage.cached_content_token_count);
            totals.cache_read = usage.cached_content_token_count;
            totals.output = usage.candidates_token_count + usage.thoughts_token_count;
        }

        let Some(candidate) = response.candidates.into_iter().next() else {
            return Ok(());
        };
        for part in candidate.content.unwrap_or_default().parts {
            self.part(part, message)?;
        }
        if let Some(reason) = candidate.finish_reason {
            match map_finish_reason(self.provider, &reason) {
                StopReason::Error => message.set_error(format!("Model stopped: {reason}")),
                mapped => message.set_stop_reason(mapped),
            }
        }
        Ok(())
    }
}

impl StreamDecoder for GoogleDecoder {
    fn decode(&mut self, event: SseEvent, message: &mut MessageBuilder) -> Result<Flow, Error> {
        if event.is_done() {
            return Ok(Flow::Done);
        }
        if event.data.trim().is_empty() {
            return Ok(Flow::Continue);
        }

        let response = if self.envelope {
            parse_event::<CloudCodeChunk>(self.provider, &event)?
                .response
                .unwrap_or_default()
        } else {
            parse_event::<GenerateResponse>(self.provider, &event)?
        };
        self.chunk(response, message)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::prepare_context;
    use crate::registry::ModelRegistry;
    use crate::types::{ThinkingContent, ToolCall};
    use serde_json::json;

    fn model(provider: &str, id: &str) -> Model {
        ModelRegistry::builtin().get_model(provider, id).cloned().unwrap()
    }

    fn body(model: &Model, context: &Context, options: &StreamOptions) -> serde_json::Value {
        let context = prepare_context(model, context, options);
        serde_json::to_value(build_generate_request(model, &context, options).unwrap()).unwrap()
    }

    #[test]
    fn test_thinking_config_levels() {
        let pro = model("google", "gemini-3-pro-preview");
        let flash = model("google", "gemini-3-flash-preview");
        let level = |m: &Model, l: Option<ThinkingLevel>| {
            let mut options = StreamOptions::new();
            options.reasoning = l;
            thinking_config(m, &options).unwrap().thinking_level.unwrap()
        };
        assert_eq!(level(&pro, Some(ThinkingLevel::Minimal)), "LOW");
        assert_eq!(level(&pro, Some(ThinkingLevel::Medium)), "HIGH");
        assert_eq!(level(&flash, Some(ThinkingLevel::Minimal)), "MINIMAL");
        assert_eq!(level(&flash, Some(ThinkingLevel::Medium)), "MEDIUM");
        assert_eq!(level(&flash, Some(ThinkingLevel::Xhigh)), "HIGH");
        assert_eq!(level(&pro, None), "LOW");
    }

    #[test]
    fn test_thinking_budget_for_older_models() {
        let flash = model("google", "gemini-2.5-flash");
        let xhigh = StreamOptions::new().reasoning(ThinkingLevel::Xhigh);
        let config = thinking_config(&flash, &xhigh).unwrap();
        assert_eq!(config.thinking_budget, Some(24_576));
        assert!(config.include_thoughts);

        let off = thinking_config(&flash, &StreamOptions::new()).unwrap();
        assert_eq!(off.thinking_budget, Some(0));

        let pro = model("google", "gemini-2.5-pro");
        let medium = StreamOptions::new().reasoning(ThinkingLevel::Medium);
        let config = thinking_config(&pro, &medium).unwrap();
        assert_eq!(config.thinking_budget, Some(8192));
        assert!(thinking_config(&pro, &StreamOptions::new()).is_none());
    }

    #[test]
    fn test_tool_round_trip_and_sentinel() {
        let model = model("google", "gemini-3-pro-preview");
        let mut turn = AssistantMessage::empty_for(&model);
        turn.content = vec![
            Content::Thinking(ThinkingContent {
                thinking: "plan".to_string(),
                signature: Some("sig-1".to_string()),
                redacted: false,
            }),
            Content::tool_call("c1", "ls", json!({"path": "."})),
            Content::ToolCall(ToolCall {
                id: "c2".to_string(),
                name: "cat".to_string(),
                arguments: json!({}),
                thought_signature: Some("sig-2".to_string()),
            }),
        ];
        turn.stop_reason = StopReason::ToolUse;
        let context = Context::system("sys")
            .with_user("go")
            .with_message(Message::Assistant(turn))
            .with_tool_result("c1", "ls", "a.rs")
            .with_message(Message::tool_result("c2", "cat", "denied", true));

        let body = body(&model, &context, &StreamOptions::new());
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        let parts = &contents[1]["parts"];
        assert_eq!(parts[0], json!({"text": "plan", "thought": true, "thoughtSignature": "sig-1"}));
        assert_eq!(parts[1]["functionCall"], json!({"name": "ls", "args": {"path": "."}}));
        assert_eq!(parts[1]["thoughtSignature"], SKIP_SIGNATURE);
        assert_eq!(parts[2]["thoughtSignature"], "sig-2");

        let responses = &contents[2]["parts"];
        assert_eq!(
            responses[0]["functionResponse"],
            json!({"name": "ls", "response": {"output": "a.rs"}})
        );
        assert_eq!(
            responses[1]["functionResponse"],
            json!({"name": "cat", "response": {"error": "denied"}})
        );
    }

    #[test]
    fn test_claude_models_carry_tool_ids() {
        let model = model("google-antigravity", "claude-sonnet-4-5");
        let mut turn = AssistantMessage::empty_for(&model);
        turn.content = vec![Content::tool_call("toolu|1", "ls", json!({}))];
        turn.stop_reason = StopReason::ToolUse;
        let context = Context::user("go")
            .with_message(Message::Assistant(turn))
            .with_tool_result("toolu|1", "ls", "ok");

        let body = body(&model, &context, &StreamOptions::new());
        assert_eq!(body["contents"][1]["parts"][0]["functionCall"]["id"], "toolu_1");
        assert_eq!(body["contents"][2]["parts"][0]["functionResponse"]["id"], "toolu_1");
    }

    fn decode(decoder: &mut GoogleDecoder, model: &Model, frames: &[&str]) -> AssistantMessage {
        let mut builder = MessageBuilder::new(model);
        for frame in frames {
            decoder.decode(SseEvent::new(*frame), &mut builder).unwrap();
        }
        decoder.finish(&mut builder).unwrap();
        builder.finish(model)
    }

    #[test]
    fn test_decode_thoughts_text_and_calls() {
        let model = model("google", "gemini-2.5-flash");
        let mut decoder = GoogleDecoder::new("google-generative-ai");
        let message = decode(
            &mut decoder,
            &model,
            &[
                r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hmm","thought":true}]}}]}"#,
                r#"{"candidates":[{"content":{"role":"model","parts":[{"text":", ok","thought":true}]}}]}"#,
                r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hello"},{"text":" there","thoughtSignature":"sig"}]}}]}"#,
                r#"{"candidates":[{"content":{"role":"model","parts":[{"functionCall":{"name":"ls","args":{"path":"/"}},"thoughtSignature":"call-sig"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":50,"candidatesTokenCount":10,"thoughtsTokenCount":5,"cachedContentTokenCount":20}}"#,
            ],
        );

        assert_eq!(message.thinking(), "Hmm, ok");
        assert_eq!(message.text(), "Hello there");
        let Content::Text(text) = &message.content[1] else {
            panic!("expected text block");
        };
        assert_eq!(text.signature.as_deref(), Some("sig"));
        let call = message.tool_calls().next().unwrap();
        assert_eq!(call.name, "ls");
        assert_eq!(call.arguments, json!({"path": "/"}));
        assert_eq!(call.thought_signature.as_deref(), Some("call-sig"));
        assert!(call.id.starts_with("ls_"));
        assert_eq!(message.stop_reason, StopReason::ToolUse);
        assert_eq!(message.usage.input, 30);
        assert_eq!(message.usage.cache_read, 20);
        assert_eq!(message.usage.output, 15);
    }

    #[test]
    fn test_decode_signature_only_part_is_thinking() {
        let model = model("google", "gemini-3-pro-preview");
        let mut decoder = GoogleDecoder::new("google-generative-ai");
        let message = decode(
            &mut decoder,
            &model,
            &[r#"{"candidates":[{"content":{"parts":[{"text":"","thoughtSignature":"opaque"},{"text":"Answer"}]},"finishReason":"STOP"}]}"#],
        );
        let Content::Thinking(thinking) = &message.content[0] else {
            panic!("expected thinking block");
        };
        assert_eq!(thinking.signature.as_deref(), Some("opaque"));
        assert_eq!(message.text(), "Answer");
        assert_eq!(message.stop_reason, StopReason::Stop);
    }

    #[test]
    fn test_decode_safety_and_envelope() {
        let model = model("google-gemini-cli", "gemini-2.5-pro");
        let mut decoder = GoogleDecoder::enveloped("google-gemini-cli");
        let message = decode(
            &mut decoder,
            &model,
            &[r#"{"response":{"candidates":[{"content":{"parts":[{"text":"I can"}]},"finishReason":"SAFETY"}]}}"#],
        );
        assert_eq!(message.text(), "I can");
        assert_eq!(message.stop_reason, StopReason::Error);
        assert_eq!(message.error_message.as_deref(), Some("Model stopped: SAFETY"));
    }
}
