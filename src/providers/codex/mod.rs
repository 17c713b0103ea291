//! ChatGPT Codex backend: the Responses protocol behind a subscription token.

pub mod bridge;
pub mod instructions;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;

use crate::provider::{
    check_payload, drive, http_client, prepare_context, send, with_headers, ApiProvider,
};
use crate::providers::openai::reasoning::{resolve_effort, Effort};
use crate::providers::openai::responses::{input_items, tools, ResponsesDecoder};
use crate::providers::openai::responses_types::{
    InputItem, MessageContent, ReasoningConfig, ResponsesRequest,
};
use crate::types::{Api, Context, Model, StreamOptions};
use crate::{AssistantStream, Error};

pub use bridge::{bridge_message, filter_stale_items};
pub use instructions::CodexInstructions;

const PROVIDER: &str = "openai-codex-responses";
const AUTH_CLAIM: &str = "https://api.openai.com/auth";

/// Codex Responses provider.
pub struct CodexProvider {
    client: Client,
    instructions: Arc<CodexInstructions>,
}

impl CodexProvider {
    pub fn new(instructions: Arc<CodexInstructions>) -> Result<Self, Error> {
        Ok(Self {
            client: http_client()?,
            instructions,
        })
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(client: Client, instructions: Arc<CodexInstructions>) -> Self {
        Self {
            client,
            instructions,
        }
    }
}

#[async_trait::async_trait]
impl ApiProvider for CodexProvider {
    fn api(&self) -> Api {
        Api::OpenAICodexResponses
    }

    async fn stream(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> Result<AssistantStream, Error> {
        let token = options.resolve_api_key(&model.provider).await?;
        let account_id = account_id(&token)?;
        let request = build_request(model, context, options, &self.instructions)?;
        let body = check_payload(model, options, &request)?;

        let endpoint = format!("{}/codex/responses", model.base_url.trim_end_matches('/'));
        tracing::debug!(
            provider = %model.provider,
            model = %model.id,
            %endpoint,
            "sending codex request"
        );

        let mut builder = self
            .client
            .post(&endpoint)
            .header("Authorization", format!("Bearer {token}"))
            .header("chatgpt-account-id", account_id)
            .header("OpenAI-Beta", "responses=experimental")
            .header("originator", "codex_cli_rs")
            .header("Accept", "text/event-stream")
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(session_id) = &options.session_id {
            builder = builder.header("session_id", session_id.as_str());
        }
        let builder = with_headers(builder, model, options);

        let signal = options.signal_or_default();
        let response = send(&model.provider, builder, &signal).await?;
        Ok(drive(model.clone(), response, ResponsesDecoder::new(PROVIDER), signal))
    }
}

/// Build the Codex body for `context`.
///
/// Fails with [`Error::MissingAsset`] when no instructions are loaded for the
/// model's family. An unset reasoning level uses the family default.
pub fn build_request(
    model: &Model,
    context: &Context,
    options: &StreamOptions,
    instructions: &CodexInstructions,
) -> Result<Value, Error> {
    let prompt = instructions.for_model(&model.id)?;
    let context = prepare_context(model, context, options);

    let mut input = Vec::new();
    if let Some(system) = &context.system_prompt {
        input.push(InputItem::message(
            "developer",
            MessageContent::Text(system.clone()),
        ));
    }
    input.extend(input_items(model, &context));

    let request = ResponsesRequest {
        model: model.id.clone(),
        instructions: Some(prompt.to_string()),
        input,
        stream: true,
        store: false,
        max_output_tokens: None,
        temperature: None,
        tools: tools(&context),
        tool_choice: Some("auto"),
        parallel_tool_calls: Some(true),
        reasoning: Some(ReasoningConfig {
            effort: resolve_effort(&model.id, options.reasoning.map(Effort::from)),
            summary: "auto",
        }),
        include: vec!["reasoning.encrypted_content"],
        prompt_cache_key: options.session_id.clone(),
    };

    let mut body = serde_json::to_value(&request)?;
    if let Some(Value::Array(items)) = body.get_mut("input") {
        let mut filtered = filter_stale_items(std::mem::take(items));
        bridge::insert_bridge(&mut filtered, bridge_message(&context.tools));
        *items = filtered;
    }
    Ok(body)
}

/// ChatGPT account id carried in the access token's auth claim.
pub fn account_id(token: &str) -> Result<String, Error> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| Error::auth("Codex token is not a JWT"))?;
    let decoded = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::auth(format!("Codex token payload is not base64: {e}")))?;
    let claims: Value = serde_json::from_slice(&decoded)
        .map_err(|e| Error::auth(format!("Codex token payload is not JSON: {e}")))?;

    claims[AUTH_CLAIM]["chatgpt_account_id"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::auth("Codex token has no chatgpt_account_id"))
}
