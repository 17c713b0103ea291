//! Builtin model catalog.
//!
//! Prices are dollars per million tokens. Entries are normalized by
//! [`ModelRegistry`](crate::registry::ModelRegistry) when the registry is built.

use std::collections::{BTreeSet, HashMap};

use crate::types::{Api, InputModality, Model, ModelCost};

const ANTHROPIC_URL: &str = "https://api.anthropic.com";
const OPENAI_URL: &str = "https://api.openai.com/v1";
const CODEX_URL: &str = "https://chatgpt.com/backend-api";
const GOOGLE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const CLOUD_CODE_URL: &str = "https://cloudcode-pa.googleapis.com";
const ANTIGRAVITY_URL: &str = "https://daily-cloudcode-pa.sandbox.googleapis.com";
const GROQ_URL: &str = "https://api.groq.com/openai/v1";
const MISTRAL_URL: &str = "https://api.mistral.ai/v1";
const XAI_URL: &str = "https://api.x.ai/v1";
const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1";

struct Entry {
    provider: &'static str,
    api: Api,
    base_url: &'static str,
    id: &'static str,
    name: &'static str,
    reasoning: bool,
    image: bool,
    cost: [f64; 4],
    context_window: u64,
    max_tokens: u64,
}

impl Entry {
    fn into_model(self) -> Model {
        let mut input = BTreeSet::from([InputModality::Text]);
        if self.image {
            input.insert(InputModality::Image);
        }
        let [cost_in, cost_out, cache_read, cache_write] = self.cost;
        Model {
            id: self.id.to_string(),
            name: self.name.to_string(),
            provider: self.provider.to_string(),
            api: self.api,
            base_url: self.base_url.to_string(),
            reasoning: self.reasoning,
            input,
            cost: ModelCost {
                input: cost_in,
                output: cost_out,
                cache_read,
                cache_write,
            },
            context_window: self.context_window,
            max_tokens: self.max_tokens,
            headers: HashMap::new(),
            compat: None,
        }
    }
}

macro_rules! entry {
    ($provider:expr, $api:expr, $url:expr, $id:expr, $name:expr,
     reasoning: $reasoning:expr, image: $image:expr,
     cost: $cost:expr, context: $ctx:expr, max: $max:expr) => {
        Entry {
            provider: $provider,
            api: $api,
            base_url: $url,
            id: $id,
            name: $name,
            reasoning: $reasoning,
            image: $image,
            cost: $cost,
            context_window: $ctx,
            max_tokens: $max,
        }
    };
}

/// All models shipped with the crate.
#[rustfmt::skip]
pub fn builtin_models() -> Vec<Model> {
    use Api::*;

    let entries = vec![
        // Anthropic
        entry!("anthropic", AnthropicMessages, ANTHROPIC_URL, "claude-opus-4-6", "Claude Opus 4.6",
            reasoning: true, image: true, cost: [5.0, 25.0, 0.5, 6.25], context: 200_000, max: 128_000),
        entry!("anthropic", AnthropicMessages, ANTHROPIC_URL, "claude-opus-4-5", "Claude Opus 4.5",
            reasoning: true, image: true, cost: [5.0, 25.0, 0.5, 6.25], context: 200_000, max: 64_000),
        entry!("anthropic", AnthropicMessages, ANTHROPIC_URL, "claude-sonnet-4-5", "Claude Sonnet 4.5",
            reasoning: true, image: true, cost: [3.0, 15.0, 0.3, 3.75], context: 200_000, max: 64_000),
        entry!("anthropic", AnthropicMessages, ANTHROPIC_URL, "claude-haiku-4-5", "Claude Haiku 4.5",
            reasoning: true, image: true, cost: [1.0, 5.0, 0.1, 1.25], context: 200_000, max: 64_000),
        entry!("anthropic", AnthropicMessages, ANTHROPIC_URL, "claude-3-5-haiku-latest", "Claude Haiku 3.5",
            reasoning: false, image: true, cost: [0.8, 4.0, 0.08, 1.0], context: 200_000, max: 8_192),
        // OpenAI Responses
        entry!("openai", OpenAIResponses, OPENAI_URL, "gpt-5.2", "GPT-5.2",
            reasoning: true, image: true, cost: [1.75, 14.0, 0.175, 0.0], context: 400_000, max: 128_000),
        entry!("openai", OpenAIResponses, OPENAI_URL, "gpt-5.1", "GPT-5.1",
            reasoning: true, image: true, cost: [1.25, 10.0, 0.125, 0.0], context: 400_000, max: 128_000),
        entry!("openai", OpenAIResponses, OPENAI_URL, "gpt-5", "GPT-5",
            reasoning: true, image: true, cost: [1.25, 10.0, 0.125, 0.0], context: 400_000, max: 128_000),
        entry!("openai", OpenAIResponses, OPENAI_URL, "gpt-5-mini", "GPT-5 Mini",
            reasoning: true, image: true, cost: [0.25, 2.0, 0.025, 0.0], context: 400_000, max: 128_000),
        entry!("openai", OpenAIResponses, OPENAI_URL, "gpt-5-nano", "GPT-5 Nano",
            reasoning: true, image: true, cost: [0.05, 0.4, 0.005, 0.0], context: 400_000, max: 128_000),
        entry!("openai", OpenAIResponses, OPENAI_URL, "o4-mini", "o4-mini",
            reasoning: true, image: true, cost: [1.1, 4.4, 0.275, 0.0], context: 200_000, max: 100_000),
        // OpenAI Chat Completions
        entry!("openai", OpenAICompletions, OPENAI_URL, "gpt-4o", "GPT-4o",
            reasoning: false, image: true, cost: [2.5, 10.0, 1.25, 0.0], context: 128_000, max: 16_384),
        entry!("openai", OpenAICompletions, OPENAI_URL, "gpt-4.1", "GPT-4.1",
            reasoning: false, image: true, cost: [2.0, 8.0, 0.5, 0.0], context: 1_047_576, max: 32_768),
        entry!("openai", OpenAICompletions, OPENAI_URL, "gpt-4.1-mini", "GPT-4.1 Mini",
            reasoning: false, image: true, cost: [0.4, 1.6, 0.1, 0.0], context: 1_047_576, max: 32_768),
        // Codex (ChatGPT subscription)
        entry!("openai-codex", OpenAICodexResponses, CODEX_URL, "gpt-5.2-codex", "GPT-5.2 Codex",
            reasoning: true, image: true, cost: [0.0, 0.0, 0.0, 0.0], context: 400_000, max: 128_000),
        entry!("openai-codex", OpenAICodexResponses, CODEX_URL, "gpt-5.1-codex-max", "GPT-5.1 Codex Max",
            reasoning: true, image: true, cost: [0.0, 0.0, 0.0, 0.0], context: 400_000, max: 128_000),
        entry!("openai-codex", OpenAICodexResponses, CODEX_URL, "gpt-5.1-codex-mini", "GPT-5.1 Codex Mini",
            reasoning: true, image: true, cost: [0.0, 0.0, 0.0, 0.0], context: 400_000, max: 128_000),
        entry!("openai-codex", OpenAICodexResponses, CODEX_URL, "gpt-5.1-codex", "GPT-5.1 Codex",
            reasoning: true, image: true, cost: [0.0, 0.0, 0.0, 0.0], context: 400_000, max: 128_000),
        entry!("openai-codex", OpenAICodexResponses, CODEX_URL, "gpt-5.2", "GPT-5.2",
            reasoning: true, image: true, cost: [0.0, 0.0, 0.0, 0.0], context: 400_000, max: 128_000),
        entry!("openai-codex", OpenAICodexResponses, CODEX_URL, "gpt-5.1", "GPT-5.1",
            reasoning: true, image: true, cost: [0.0, 0.0, 0.0, 0.0], context: 400_000, max: 128_000),
        // Google Generative AI
        entry!("google", GoogleGenerativeAI, GOOGLE_URL, "gemini-3-pro-preview", "Gemini 3 Pro Preview",
            reasoning: true, image: true, cost: [2.0, 12.0, 0.2, 0.0], context: 1_048_576, max: 65_536),
        entry!("google", GoogleGenerativeAI, GOOGLE_URL, "gemini-3-flash-preview", "Gemini 3 Flash Preview",
            reasoning: true, image: true, cost: [0.5, 3.0, 0.05, 0.0], context: 1_048_576, max: 65_536),
        entry!("google", GoogleGenerativeAI, GOOGLE_URL, "gemini-2.5-pro", "Gemini 2.5 Pro",
            reasoning: true, image: true, cost: [1.25, 10.0, 0.31, 0.0], context: 1_048_576, max: 65_536),
        entry!("google", GoogleGenerativeAI, GOOGLE_URL, "gemini-2.5-flash", "Gemini 2.5 Flash",
            reasoning: true, image: true, cost: [0.3, 2.5, 0.075, 0.0], context: 1_048_576, max: 65_536),
        entry!("google", GoogleGenerativeAI, GOOGLE_URL, "gemini-2.0-flash", "Gemini 2.0 Flash",
            reasoning: false, image: true, cost: [0.1, 0.4, 0.025, 0.0], context: 1_048_576, max: 8_192),
        // Google Vertex AI
        entry!("google-vertex", GoogleVertex, "", "gemini-2.5-pro", "Gemini 2.5 Pro (Vertex)",
            reasoning: true, image: true, cost: [1.25, 10.0, 0.31, 0.0], context: 1_048_576, max: 65_536),
        entry!("google-vertex", GoogleVertex, "", "gemini-2.5-flash", "Gemini 2.5 Flash (Vertex)",
            reasoning: true, image: true, cost: [0.3, 2.5, 0.075, 0.0], context: 1_048_576, max: 65_536),
        entry!("google-vertex", GoogleVertex, "", "gemini-3-pro-preview", "Gemini 3 Pro Preview (Vertex)",
            reasoning: true, image: true, cost: [2.0, 12.0, 0.2, 0.0], context: 1_048_576, max: 65_536),
        // Cloud Code Assist
        entry!("google-gemini-cli", GoogleGeminiCli, CLOUD_CODE_URL, "gemini-2.5-pro", "Gemini 2.5 Pro (Cloud Code Assist)",
            reasoning: true, image: true, cost: [0.0, 0.0, 0.0, 0.0], context: 1_048_576, max: 65_535),
        entry!("google-gemini-cli", GoogleGeminiCli, CLOUD_CODE_URL, "gemini-3-pro-preview", "Gemini 3 Pro Preview (Cloud Code Assist)",
            reasoning: true, image: true, cost: [0.0, 0.0, 0.0, 0.0], context: 1_048_576, max: 65_535),
        entry!("google-antigravity", GoogleGeminiCli, ANTIGRAVITY_URL, "gemini-3-pro-high", "Gemini 3 Pro High (Antigravity)",
            reasoning: true, image: true, cost: [0.0, 0.0, 0.0, 0.0], context: 1_048_576, max: 65_535),
        entry!("google-antigravity", GoogleGeminiCli, ANTIGRAVITY_URL, "claude-sonnet-4-5", "Claude Sonnet 4.5 (Antigravity)",
            reasoning: false, image: true, cost: [0.0, 0.0, 0.0, 0.0], context: 200_000, max: 64_000),
        entry!("google-antigravity", GoogleGeminiCli, ANTIGRAVITY_URL, "claude-sonnet-4-5-thinking", "Claude Sonnet 4.5 Thinking (Antigravity)",
            reasoning: true, image: true, cost: [0.0, 0.0, 0.0, 0.0], context: 200_000, max: 64_000),
        // OpenAI-compatible vendors
        entry!("groq", OpenAICompletions, GROQ_URL, "llama-3.3-70b-versatile", "Llama 3.3 70B Versatile",
            reasoning: false, image: false, cost: [0.59, 0.79, 0.0, 0.0], context: 131_072, max: 32_768),
        entry!("groq", OpenAICompletions, GROQ_URL, "qwen/qwen3-32b", "Qwen3 32B",
            reasoning: true, image: false, cost: [0.29, 0.59, 0.0, 0.0], context: 131_072, max: 40_960),
        entry!("mistral", OpenAICompletions, MISTRAL_URL, "devstral-medium-latest", "Devstral Medium",
            reasoning: false, image: false, cost: [0.4, 2.0, 0.0, 0.0], context: 128_000, max: 128_000),
        entry!("mistral", OpenAICompletions, MISTRAL_URL, "mistral-large-latest", "Mistral Large",
            reasoning: false, image: true, cost: [0.5, 1.5, 0.0, 0.0], context: 262_144, max: 262_144),
        entry!("xai", OpenAICompletions, XAI_URL, "grok-4", "Grok 4",
            reasoning: true, image: true, cost: [3.0, 15.0, 0.75, 0.0], context: 256_000, max: 64_000),
        entry!("xai", OpenAICompletions, XAI_URL, "grok-code-fast-1", "Grok Code Fast 1",
            reasoning: true, image: false, cost: [0.2, 1.5, 0.02, 0.0], context: 256_000, max: 10_000),
        entry!("openrouter", OpenAICompletions, OPENROUTER_URL, "anthropic/claude-sonnet-4.5", "Claude Sonnet 4.5 (OpenRouter)",
            reasoning: true, image: true, cost: [3.0, 15.0, 0.3, 3.75], context: 1_000_000, max: 64_000),
        entry!("openrouter", OpenAICompletions, OPENROUTER_URL, "deepseek/deepseek-r1", "DeepSeek R1 (OpenRouter)",
            reasoning: true, image: false, cost: [0.4, 2.0, 0.0, 0.0], context: 163_840, max: 163_840),
    ];

    entries.into_iter().map(Entry::into_model).collect()
}
