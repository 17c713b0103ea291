use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::attachments::{ImageLimitOverrides, ManyImageLimit};
use crate::history::MessageExtensions;
use crate::types::Model;
use crate::Error;

/// Requested reasoning depth. `None` in [`StreamOptions::reasoning`] means off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    Minimal,
    Low,
    Medium,
    High,
    Xhigh,
}

impl ThinkingLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ThinkingLevel::Minimal => "minimal",
            ThinkingLevel::Low => "low",
            ThinkingLevel::Medium => "medium",
            ThinkingLevel::High => "high",
            ThinkingLevel::Xhigh => "xhigh",
        }
    }
}

/// Token budgets for vendors that size reasoning in tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkingBudgets {
    pub minimal: u64,
    pub low: u64,
    pub medium: u64,
    pub high: u64,
    pub xhigh: u64,
}

impl Default for ThinkingBudgets {
    fn default() -> Self {
        Self {
            minimal: 1024,
            low: 2048,
            medium: 8192,
            high: 16384,
            xhigh: 32768,
        }
    }
}

impl ThinkingBudgets {
    pub fn for_level(&self, level: ThinkingLevel) -> u64 {
        match level {
            ThinkingLevel::Minimal => self.minimal,
            ThinkingLevel::Low => self.low,
            ThinkingLevel::Medium => self.medium,
            ThinkingLevel::High => self.high,
            ThinkingLevel::Xhigh => self.xhigh,
        }
    }
}

/// Prompt-cache retention hint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheRetention {
    None,
    /// Vendor default short-lived cache.
    #[default]
    Short,
    /// Extended retention where the vendor offers it (1h on Anthropic).
    Long,
}

/// Resolves an API key at call time, e.g. to refresh a rotating OAuth token.
#[async_trait::async_trait]
pub trait ApiKeyResolver: Send + Sync {
    async fn resolve(&self, provider: &str) -> Result<Option<String>, Error>;
}

/// Inspection hook called with the built vendor body before it is sent.
/// Returning an error aborts the call without touching the network.
pub type PayloadHook = Arc<dyn Fn(&Model, &serde_json::Value) -> Result<(), Error> + Send + Sync>;

/// Per-call options.
#[derive(Clone, Default)]
pub struct StreamOptions {
    pub api_key: Option<String>,
    pub api_key_resolver: Option<Arc<dyn ApiKeyResolver>>,
    pub signal: Option<CancellationToken>,
    pub on_payload: Option<PayloadHook>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u64>,
    pub reasoning: Option<ThinkingLevel>,
    pub thinking_budgets: ThinkingBudgets,
    pub cache_retention: CacheRetention,
    pub session_id: Option<String>,
    pub headers: HashMap<String, String>,
    pub image_limits: ImageLimitOverrides,
    /// Google Cloud project for Vertex AI.
    pub project: Option<String>,
    /// Google Cloud region for Vertex AI, e.g. `us-central1`.
    pub location: Option<String>,
    /// Converters for `custom` history messages.
    pub extensions: Option<Arc<MessageExtensions>>,
}

impl fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOptions")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_resolver", &self.api_key_resolver.is_some())
            .field("signal", &self.signal)
            .field("on_payload", &self.on_payload.is_some())
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("reasoning", &self.reasoning)
            .field("thinking_budgets", &self.thinking_budgets)
            .field("cache_retention", &self.cache_retention)
            .field("session_id", &self.session_id)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("image_limits", &self.image_limits)
            .field("project", &self.project)
            .field("location", &self.location)
            .field("extensions", &self.extensions)
            .finish()
    }
}

impl StreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn api_key_resolver(mut self, resolver: Arc<dyn ApiKeyResolver>) -> Self {
        self.api_key_resolver = Some(resolver);
        self
    }

    pub fn signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn on_payload<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Model, &serde_json::Value) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.on_payload = Some(Arc::new(hook));
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn reasoning(mut self, level: ThinkingLevel) -> Self {
        self.reasoning = Some(level);
        self
    }

    pub fn cache_retention(mut self, retention: CacheRetention) -> Self {
        self.cache_retention = retention;
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn provider_label(mut self, label: impl Into<String>) -> Self {
        self.image_limits.provider_label = Some(label.into());
        self
    }

    pub fn max_bytes(mut self, max_bytes: u64) -> Self {
        self.image_limits.max_bytes = Some(max_bytes);
        self
    }

    pub fn max_dimension(mut self, max_dimension: u32) -> Self {
        self.image_limits.max_dimension = Some(max_dimension);
        self
    }

    pub fn many_image_limit(mut self, threshold: usize, max_dimension: u32) -> Self {
        self.image_limits.many_image_limit = Some(ManyImageLimit {
            threshold,
            max_dimension,
        });
        self
    }

    pub fn max_images(mut self, max_images: usize) -> Self {
        self.image_limits.max_images = Some(max_images);
        self
    }

    pub fn vertex(mut self, project: impl Into<String>, location: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self.location = Some(location.into());
        self
    }

    pub fn extensions(mut self, extensions: Arc<MessageExtensions>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    /// The cancellation token for this call, or a fresh one that never fires.
    pub(crate) fn signal_or_default(&self) -> CancellationToken {
        self.signal.clone().unwrap_or_default()
    }

    /// Resolve the API key: explicit key first, then the resolver.
    pub(crate) async fn resolve_api_key(&self, provider: &str) -> Result<String, Error> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }
        if let Some(resolver) = &self.api_key_resolver {
            if let Some(key) = resolver.resolve(provider).await? {
                return Ok(key);
            }
        }
        Err(Error::auth(format!("No API key for provider: {provider}")))
    }
}
