//! Google Gemini: Generative Language API, Vertex AI and Cloud Code Assist.

pub mod cli;
pub mod shared;
pub mod types;
pub mod vertex;

use reqwest::Client;

use crate::provider::{
    check_payload, drive, http_client, prepare_context, send, with_headers, ApiProvider,
};
use crate::types::{Api, Context, Model, StreamOptions};
use crate::{AssistantStream, Error};
use shared::{build_generate_request, GoogleDecoder};
use types::GenerateRequest;

pub use cli::CloudCodeProvider;
pub use vertex::VertexProvider;

const PROVIDER: &str = "google-generative-ai";

/// Generative Language API provider (API-key auth).
pub struct GoogleProvider {
    client: Client,
}

impl GoogleProvider {
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
impl ApiProvider for GoogleProvider {
    fn api(&self) -> Api {
        Api::GoogleGenerativeAI
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

        let endpoint = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            model.base_url.trim_end_matches('/'),
            model.id
        );
        tracing::debug!(
            provider = %model.provider,
            model = %model.id,
            %endpoint,
            "sending gemini request"
        );

        let builder = self
            .client
            .post(&endpoint)
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(&body);
        let builder = with_headers(builder, model, options);

        let signal = options.signal_or_default();
        let response = send(&model.provider, builder, &signal).await?;
        Ok(drive(model.clone(), response, GoogleDecoder::new(PROVIDER), signal))
    }
}

/// Build the `generateContent` body for `context`.
pub fn build_request(
    model: &Model,
    context: &Context,
    options: &StreamOptions,
) -> Result<GenerateRequest, Error> {
    let context = prepare_context(model, context, options);
    build_generate_request(model, &context, options)
}
