//! Vertex AI: the Generative body on a project-scoped endpoint, with bearer
//! auth from the caller or Application Default Credentials.

use reqwest::Client;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::shared::{build_generate_request, GoogleDecoder};
use crate::provider::{
    check_payload, drive, http_client, prepare_context, send, with_headers, ApiProvider,
};
use crate::types::{Api, Context, Model, StreamOptions};
use crate::{AssistantStream, Error};

const PROVIDER: &str = "google-vertex";
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const MISSING_TARGET: &str =
    "Vertex AI requires a {field} (StreamOptions::vertex or VertexProvider::with_defaults)";

/// Vertex AI provider.
pub struct VertexProvider {
    client: Client,
    project: Option<String>,
    location: Option<String>,
    adc: OnceCell<Arc<dyn gcp_auth::TokenProvider>>,
}

impl VertexProvider {
    pub fn new() -> Result<Self, Error> {
        Ok(Self::with_client(http_client()?))
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            project: None,
            location: None,
            adc: OnceCell::new(),
        }
    }

    /// Project and region used when the call does not name them.
    pub fn with_defaults(
        mut self,
        project: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        self.project = Some(project.into());
        self.location = Some(location.into());
        self
    }

    fn target<'a>(&'a self, options: &'a StreamOptions) -> Result<(&'a str, &'a str), Error> {
        let project = options
            .project
            .as_deref()
            .or(self.project.as_deref())
            .ok_or_else(|| Error::config(MISSING_TARGET.replace("{field}", "project")))?;
        let location = options
            .location
            .as_deref()
            .or(self.location.as_deref())
            .ok_or_else(|| Error::config(MISSING_TARGET.replace("{field}", "location")))?;
        Ok((project, location))
    }

    async fn bearer(&self, model: &Model, options: &StreamOptions) -> Result<String, Error> {
        match options.resolve_api_key(&model.provider).await {
            Ok(token) => return Ok(token),
            Err(Error::Auth(_)) => {}
            Err(e) => return Err(e),
        }

        let provider = self
            .adc
            .get_or_try_init(|| async {
                gcp_auth::provider().await.map_err(|e| {
                    Error::auth(format!("Application Default Credentials unavailable: {e}"))
                })
            })
            .await?;
        let token = provider
            .token(&[CLOUD_PLATFORM_SCOPE])
            .await
            .map_err(|e| Error::auth(format!("Failed to get ADC token: {e}")))?;
        Ok(token.as_str().to_string())
    }
}

/// Streaming endpoint for `model` in `project`/`location`.
pub fn endpoint(model: &Model, project: &str, location: &str) -> String {
    let base = if model.base_url.is_empty() {
        format!("https://{location}-aiplatform.googleapis.com")
    } else {
        model.base_url.trim_end_matches('/').to_string()
    };
    format!(
        "{base}/v1/projects/{project}/locations/{location}/publishers/google/models/{}:streamGenerateContent?alt=sse",
        model.id
    )
}

#[async_trait::async_trait]
impl ApiProvider for VertexProvider {
    fn api(&self) -> Api {
        Api::GoogleVertex
    }

    async fn stream(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> Result<AssistantStream, Error> {
        let (project, location) = self.target(options)?;
        let context = prepare_context(model, context, options);
        let request = build_generate_request(model, &context, options)?;
        let body = check_payload(model, options, &request)?;
        let token = self.bearer(model, options).await?;

        let endpoint = endpoint(model, project, location);
        tracing::debug!(
            provider = %model.provider,
            model = %model.id,
            %endpoint,
            "sending vertex request"
        );

        let builder = self
            .client
            .post(&endpoint)
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", "application/json")
            .json(&body);
        let builder = with_headers(builder, model, options);

        let signal = options.signal_or_default();
        let response = send(&model.provider, builder, &signal).await?;
        Ok(drive(model.clone(), response, GoogleDecoder::new(PROVIDER), signal))
    }
}
