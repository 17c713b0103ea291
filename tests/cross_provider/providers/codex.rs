use super::{load_fixture, JsonBody, ProviderConfig, ProviderTestSetup, WEATHER_REPORT};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use platformed_ai::{ApiProvider, CodexInstructions, CodexProvider, StreamOptions};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CODEX_PROMPT: &str = "You are Codex, a coding agent running in a terminal.";

/// Unsigned JWT carrying the ChatGPT account claim.
pub fn codex_token(account: &str) -> String {
    let claims = json!({"https://api.openai.com/auth": {"chatgpt_account_id": account}});
    format!(
        "eyJhbGciOiJub25lIn0.{}.signature",
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

pub struct CodexTestSetup;

#[async_trait::async_trait]
impl ProviderTestSetup for CodexTestSetup {
    fn get_config() -> ProviderConfig {
        ProviderConfig {
            name: "ChatGPT Codex",
            provider: "openai-codex",
            model: "gpt-5.1-codex",
        }
    }

    fn create_provider() -> Arc<dyn ApiProvider> {
        let instructions = CodexInstructions::new().with("codex", CODEX_PROMPT);
        Arc::new(CodexProvider::with_client(reqwest::Client::new(), Arc::new(instructions)))
    }

    fn options() -> StreamOptions {
        StreamOptions::new()
            .api_key(codex_token("acct-test"))
            .session_id("session-1")
    }

    async fn mount_function_calling_mocks(
        mock_server: &MockServer,
    ) -> Result<(), Box<dyn std::error::Error>> {
        Mock::given(method("POST"))
            .and(path("/codex/responses"))
            .and(body_string_contains(WEATHER_REPORT))
            .and(JsonBody(|body| {
                let input = body["input"].as_array().map(Vec::as_slice).unwrap_or_default();
                let bridges = input
                    .iter()
                    .filter(|i| {
                        i["content"][0]["text"]
                            .as_str()
                            .is_some_and(|t| t.starts_with("# Tool availability"))
                    })
                    .count();
                bridges == 1
                    && input.iter().all(|i| i.get("id").is_none())
                    && input
                        .iter()
                        .any(|i| i["type"] == "function_call_output" && i["call_id"] == "call_abc")
            }))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(load_fixture("openai/responses_final.sse"))
                    .insert_header("content-type", "text/event-stream"),
            )
            .expect(1)
            .mount(mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/codex/responses"))
            .and(header("chatgpt-account-id", "acct-test"))
            .and(header("OpenAI-Beta", "responses=experimental"))
            .and(header("originator", "codex_cli_rs"))
            .and(header("session_id", "session-1"))
            .and(JsonBody(|body| {
                body["instructions"] == CODEX_PROMPT
                    && body["store"] == false
                    && body["tool_choice"] == "auto"
                    && body["parallel_tool_calls"] == true
                    && body["prompt_cache_key"] == "session-1"
                    && body.get("max_output_tokens").is_none()
                    && body.get("temperature").is_none()
                    && body["input"][0]["role"] == "developer"
                    && body["input"][0]["content"][0]["text"]
                        .as_str()
                        .is_some_and(|t| t.contains("`get_weather`"))
                    && body["input"][1]["role"] == "developer"
            }))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(load_fixture("openai/responses_function_call.sse"))
                    .insert_header("content-type", "text/event-stream"),
            )
            .expect(1)
            .mount(mock_server)
            .await;

        Ok(())
    }
}
