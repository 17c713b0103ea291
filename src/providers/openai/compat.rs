//! Dialect detection for servers speaking the Chat Completions API.

use crate::types::{MaxTokensField, Model, ThinkingFormat};

/// Fully resolved dialect: explicit overrides on top of detected defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compat {
    pub supports_store: bool,
    pub supports_developer_role: bool,
    pub supports_reasoning_effort: bool,
    pub max_tokens_field: MaxTokensField,
    pub requires_tool_result_name: bool,
    pub requires_assistant_after_tool_result: bool,
    pub requires_thinking_as_text: bool,
    pub requires_mistral_tool_ids: bool,
    pub thinking_format: ThinkingFormat,
}

fn is_host(model: &Model, provider: &str, host: &str) -> bool {
    model.provider == provider || model.base_url.contains(host)
}

/// Defaults inferred from the provider name and base URL.
pub fn detect(model: &Model) -> Compat {
    let mistral = is_host(model, "mistral", "mistral.ai");
    let xai = is_host(model, "xai", "api.x.ai");
    let groq = is_host(model, "groq", "groq.com");
    let cerebras = is_host(model, "cerebras", "cerebras.ai");
    let zai = is_host(model, "zai", "api.z.ai");
    let chutes = model.base_url.contains("chutes.ai");
    let deepseek = is_host(model, "deepseek", "deepseek.com");

    let non_standard = mistral || xai || cerebras || zai || chutes || deepseek;

    Compat {
        supports_store: !non_standard && !groq,
        supports_developer_role: !non_standard,
        supports_reasoning_effort: !xai && !zai && !mistral,
        max_tokens_field: if chutes || mistral {
            MaxTokensField::MaxTokens
        } else {
            MaxTokensField::MaxCompletionTokens
        },
        requires_tool_result_name: mistral,
        requires_assistant_after_tool_result: false,
        requires_thinking_as_text: mistral,
        requires_mistral_tool_ids: mistral,
        thinking_format: ThinkingFormat::ReasoningFields,
    }
}

/// Detected defaults with the model's explicit overrides applied.
pub fn resolve(model: &Model) -> Compat {
    let detected = detect(model);
    let Some(explicit) = &model.compat else {
        return detected;
    };

    Compat {
        supports_store: explicit.supports_store.unwrap_or(detected.supports_store),
        supports_developer_role: explicit
            .supports_developer_role
            .unwrap_or(detected.supports_developer_role),
        supports_reasoning_effort: explicit
            .supports_reasoning_effort
            .unwrap_or(detected.supports_reasoning_effort),
        max_tokens_field: explicit.max_tokens_field.unwrap_or(detected.max_tokens_field),
        requires_tool_result_name: explicit
            .requires_tool_result_name
            .unwrap_or(detected.requires_tool_result_name),
        requires_assistant_after_tool_result: explicit
            .requires_assistant_after_tool_result
            .unwrap_or(detected.requires_assistant_after_tool_result),
        requires_thinking_as_text: explicit
            .requires_thinking_as_text
            .unwrap_or(detected.requires_thinking_as_text),
        requires_mistral_tool_ids: explicit
            .requires_mistral_tool_ids
            .unwrap_or(detected.requires_mistral_tool_ids),
        thinking_format: explicit.thinking_format.unwrap_or(detected.thinking_format),
    }
}
