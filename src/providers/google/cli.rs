//! Cloud Code Assist (`v1internal`), used by Gemini CLI and Antigravity
//! subscriptions. The credential is a JSON object carrying an OAuth token
//! and the Cloud Code project.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::shared::{build_generate_request, GoogleDecoder};
use super::types::{GenerateRequest, GooglePart, SystemInstruction};
use crate::provider::{
    check_payload, drive, http_client, prepare_context, send, with_headers, ApiProvider,
};
use crate::types::{Api, Context, Model, StreamOptions};
use crate::{AssistantStream, Error};

const PROVIDER: &str = "google-gemini-cli";

/// System instruction Antigravity requests start with.
pub const ANTIGRAVITY_IDENTITY: &str = "You are Antigravity, a powerful agentic AI coding \
    assistant designed by the Google Deepmind team working on Advanced Agentic Coding.";

/// Parsed Cloud Code credential.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudCodeCredential {
    pub token: String,
    pub project_id: String,
}

impl CloudCodeCredential {
    pub fn parse(api_key: &str) -> Result<Self, Error> {
        serde_json::from_str(api_key).map_err(|e| {
            Error::auth(format!(
                "Cloud Code Assist key must be JSON {{\"token\", \"projectId\"}}: {e}"
            ))
        })
    }
}

/// Request envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudCodeRequest {
    pub project: String,
    pub model: String,
    pub request: GenerateRequest,
    pub user_agent: &'static str,
    pub request_id: String,
}

/// Cloud Code Assist provider, serving both the Gemini CLI and Antigravity flavors.
pub struct CloudCodeProvider {
    client: Client,
}

impl CloudCodeProvider {
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

fn is_antigravity(model: &Model) -> bool {
    model.provider == "google-antigravity"
}

/// Build the Cloud Code envelope for `context` in `project`.
pub fn build_request(
    model: &Model,
    context: &Context,
    options: &StreamOptions,
    project: &str,
) -> Result<CloudCodeRequest, Error> {
    let context = prepare_context(model, context, options);
    let mut request = build_generate_request(model, &context, options)?;
    request.session_id = options.session_id.clone();

    if is_antigravity(model) {
        let mut instruction = request.system_instruction.take().unwrap_or(SystemInstruction {
            role: None,
            parts: Vec::new(),
        });
        let present = instruction
            .parts
            .first()
            .and_then(|p| p.text.as_deref())
            .is_some_and(|t| t.starts_with(ANTIGRAVITY_IDENTITY));
        if !present {
            instruction.parts.insert(0, GooglePart::text(ANTIGRAVITY_IDENTITY));
        }
        instruction.role = Some("user");
        request.system_instruction = Some(instruction);
    }

    Ok(CloudCodeRequest {
        project: project.to_string(),
        model: model.id.clone(),
        request,
        user_agent: if is_antigravity(model) { "antigravity" } else { "gemini-cli" },
        request_id: uuid::Uuid::new_v4().to_string(),
    })
}

#[async_trait::async_trait]
impl ApiProvider for CloudCodeProvider {
    fn api(&self) -> Api {
        Api::GoogleGeminiCli
    }

    async fn stream(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> Result<AssistantStream, Error> {
        let api_key = options.resolve_api_key(&model.provider).await?;
        let credential = CloudCodeCredential::parse(&api_key)?;
        let request = build_request(model, context, options, &credential.project_id)?;
        let body = check_payload(model, options, &request)?;

        let endpoint = format!(
            "{}/v1internal:streamGenerateContent?alt=sse",
            model.base_url.trim_end_matches('/')
        );
        tracing::debug!(
            provider = %model.provider,
            model = %model.id,
            %endpoint,
            "sending cloud code request"
        );

        let builder = self
            .client
            .post(&endpoint)
            .header("Authorization", format!("Bearer {}", credential.token))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body);
        let builder = with_headers(builder, model, options);

        let signal = options.signal_or_default();
        let response = send(&model.provider, builder, &signal).await?;
        Ok(drive(model.clone(), response, GoogleDecoder::enveloped(PROVIDER), signal))
    }
}
