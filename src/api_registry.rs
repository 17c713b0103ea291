//! Dispatch from a model's [`Api`] to the adapter that speaks it.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::history::MessageExtensions;
use crate::provider::ApiProvider;
use crate::providers::{
    AnthropicProvider, CloudCodeProvider, CodexInstructions, CodexProvider, GoogleProvider,
    OpenAICompletionsProvider, OpenAIResponsesProvider, VertexProvider,
};
use crate::registry::{calculate_cost, ModelRegistry};
use crate::types::{Api, AssistantMessage, Context, Cost, Model, StreamOptions, Usage};
use crate::{AssistantStream, Error};

/// Adapters keyed by the API they serve.
#[derive(Clone, Default)]
pub struct ApiRegistry {
    providers: HashMap<Api, Arc<dyn ApiProvider>>,
}

impl fmt::Debug for ApiRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut apis: Vec<&str> = self.providers.keys().map(Api::as_str).collect();
        apis.sort_unstable();
        f.debug_struct("ApiRegistry").field("apis", &apis).finish()
    }
}

impl ApiRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in adapter. Codex starts without instructions; calls to it
    /// fail with [`Error::MissingAsset`] until
    /// [`with_codex_instructions`](Self::with_codex_instructions) is used.
    pub fn builtin() -> Result<Self, Error> {
        let mut registry = Self::new();
        registry.register(Arc::new(AnthropicProvider::new()?));
        registry.register(Arc::new(OpenAICompletionsProvider::new()?));
        registry.register(Arc::new(OpenAIResponsesProvider::new()?));
        registry.register(Arc::new(CodexProvider::new(Arc::new(CodexInstructions::new()))?));
        registry.register(Arc::new(GoogleProvider::new()?));
        registry.register(Arc::new(VertexProvider::new()?));
        registry.register(Arc::new(CloudCodeProvider::new()?));
        Ok(registry)
    }

    /// Replace the Codex adapter with one using `instructions`.
    pub fn with_codex_instructions(
        mut self,
        instructions: Arc<CodexInstructions>,
    ) -> Result<Self, Error> {
        self.register(Arc::new(CodexProvider::new(instructions)?));
        Ok(self)
    }

    /// Register `provider` under the API it reports, returning the adapter it replaced.
    pub fn register(&mut self, provider: Arc<dyn ApiProvider>) -> Option<Arc<dyn ApiProvider>> {
        let api = provider.api();
        tracing::debug!(%api, "registering api provider");
        self.providers.insert(api, provider)
    }

    pub fn get(&self, api: &Api) -> Result<Arc<dyn ApiProvider>, Error> {
        self.providers
            .get(api)
            .cloned()
            .ok_or_else(|| Error::UnsupportedApi(api.to_string()))
    }

    pub fn contains(&self, api: &Api) -> bool {
        self.providers.contains_key(api)
    }
}

/// Entry point tying the model catalog to the adapters.
///
/// ```no_run
/// # async fn run() -> Result<(), platformed_ai::Error> {
/// use platformed_ai::{Client, Context, StreamOptions};
///
/// let client = Client::builtin()?;
/// let model = client.get_model("anthropic", "claude-sonnet-4-5").cloned().unwrap();
/// let reply = client
///     .complete(&model, &Context::user("Hello"), &StreamOptions::new().api_key("sk-..."))
///     .await?;
/// println!("{}", reply.text());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    models: Arc<ModelRegistry>,
    apis: ApiRegistry,
    extensions: Option<Arc<MessageExtensions>>,
}

impl Client {
    pub fn new(models: Arc<ModelRegistry>, apis: ApiRegistry) -> Self {
        Self {
            models,
            apis,
            extensions: None,
        }
    }

    /// Built-in catalog and adapters.
    pub fn builtin() -> Result<Self, Error> {
        Ok(Self::new(Arc::new(ModelRegistry::builtin()), ApiRegistry::builtin()?))
    }

    /// Converters applied to `custom` history messages on every call that
    /// does not bring its own.
    pub fn with_extensions(mut self, extensions: Arc<MessageExtensions>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn apis(&self) -> &ApiRegistry {
        &self.apis
    }

    pub fn apis_mut(&mut self) -> &mut ApiRegistry {
        &mut self.apis
    }

    pub fn get_model(&self, provider: &str, id: &str) -> Option<&Model> {
        self.models.get_model(provider, id)
    }

    pub fn get_models(&self, provider: &str) -> Vec<&Model> {
        self.models.get_models(provider)
    }

    pub fn get_providers(&self) -> Vec<&str> {
        self.models.get_providers()
    }

    /// Stream one assistant turn from `model`.
    pub async fn stream(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> Result<AssistantStream, Error> {
        let provider = self.apis.get(&model.api)?;

        let options = match (&options.extensions, &self.extensions) {
            (None, Some(extensions)) => {
                let mut owned = options.clone();
                owned.extensions = Some(Arc::clone(extensions));
                Cow::Owned(owned)
            }
            _ => Cow::Borrowed(options),
        };

        tracing::debug!(
            api = %model.api,
            provider = %model.provider,
            model = %model.id,
            messages = context.messages.len(),
            "dispatching stream"
        );
        provider.stream(model, context, &options).await
    }

    /// Stream and wait for the final message.
    pub async fn complete(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> Result<AssistantMessage, Error> {
        self.stream(model, context, options).await?.result().await
    }

    /// Price `usage` against `model`, filling `usage.cost`.
    pub fn calculate_cost(&self, model: &Model, usage: &mut Usage) -> Cost {
        calculate_cost(model, usage)
    }
}
