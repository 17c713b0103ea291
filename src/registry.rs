//! Model lookup and cost arithmetic.

use std::collections::HashMap;

use crate::catalog;
use crate::types::{Cost, InputModality, Model, Usage};
use crate::Error;

/// Providers whose endpoints accept documents wherever they accept images.
const DOCUMENT_PROVIDERS: &[&str] = &[
    "anthropic",
    "google",
    "google-vertex",
    "google-gemini-cli",
    "google-antigravity",
];

/// Read-only model catalog keyed by `(provider, id)`.
///
/// Built once and shared behind an `Arc`; nothing mutates it afterwards.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Vec<Model>,
    index: HashMap<(String, String), usize>,
    providers: Vec<String>,
}

impl ModelRegistry {
    /// The catalog shipped with the crate.
    pub fn builtin() -> Self {
        Self::from_models(catalog::builtin_models())
    }

    /// Build from an injected model list. A later entry with the same
    /// `(provider, id)` replaces the earlier one.
    pub fn from_models(models: Vec<Model>) -> Self {
        let mut registry = ModelRegistry::default();
        for model in models {
            let model = normalize_model_input(model);
            let key = (model.provider.clone(), model.id.clone());
            match registry.index.get(&key) {
                Some(&slot) => registry.models[slot] = model,
                None => {
                    if !registry.providers.contains(&model.provider) {
                        registry.providers.push(model.provider.clone());
                    }
                    registry.index.insert(key, registry.models.len());
                    registry.models.push(model);
                }
            }
        }
        registry
    }

    /// Build from a JSON array of camelCase model descriptors.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let models: Vec<Model> = serde_json::from_str(json)?;
        if let Some(model) = models.iter().find(|m| m.id.is_empty() || m.provider.is_empty()) {
            return Err(Error::config(format!(
                "catalog entry \"{}\" is missing a provider or id",
                model.name
            )));
        }
        Ok(Self::from_models(models))
    }

    pub fn get_model(&self, provider: &str, id: &str) -> Option<&Model> {
        self.index
            .get(&(provider.to_string(), id.to_string()))
            .map(|&slot| &self.models[slot])
    }

    /// Every model of `provider`, in catalog order.
    pub fn get_models(&self, provider: &str) -> Vec<&Model> {
        self.models.iter().filter(|m| m.provider == provider).collect()
    }

    /// Provider names, in order of first appearance.
    pub fn get_providers(&self) -> Vec<&str> {
        self.providers.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Widen `input` with `document` for providers that take documents wherever
/// they take images.
pub fn normalize_model_input(mut model: Model) -> Model {
    if DOCUMENT_PROVIDERS.contains(&model.provider.as_str())
        && model.accepts(InputModality::Image)
    {
        model.input.insert(InputModality::Document);
    }
    model
}

/// Price `usage` against `model`, store the result in `usage.cost` and return it.
pub fn calculate_cost(model: &Model, usage: &mut Usage) -> Cost {
    let per_token = |price: f64, tokens: u64| (price / 1_000_000.0) * tokens as f64;
    let input = per_token(model.cost.input, usage.input);
    let output = per_token(model.cost.output, usage.output);
    let cache_read = per_token(model.cost.cache_read, usage.cache_read);
    let cache_write = per_token(model.cost.cache_write, usage.cache_write);

    let cost = Cost {
        input,
        output,
        cache_read,
        cache_write,
        total: input + output + cache_read + cache_write,
    };
    usage.cost = cost;
    cost
}

/// Whether the model accepts the `xhigh` reasoning tier.
pub fn supports_xhigh(model: &Model) -> bool {
    let id = model.id.as_str();
    id.contains("gpt-5.2")
        || id.contains("codex-max")
        || id.contains("opus-4-6")
        || id.contains("opus-4.6")
}

/// Identity comparison on `(provider, id)`.
pub fn models_are_equal(a: &Model, b: &Model) -> bool {
    a.same_as(&b.provider, &b.id)
}
