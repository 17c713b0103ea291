use super::{load_fixture, JsonBody, ProviderConfig, ProviderTestSetup, WEATHER_REPORT};
use platformed_ai::{ApiProvider, OpenAICompletionsProvider, OpenAIResponsesProvider};
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse(fixture: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(load_fixture(fixture))
        .insert_header("content-type", "text/event-stream")
}

pub struct OpenAICompletionsTestSetup;

#[async_trait::async_trait]
impl ProviderTestSetup for OpenAICompletionsTestSetup {
    fn get_config() -> ProviderConfig {
        ProviderConfig {
            name: "OpenAI Chat Completions",
            provider: "openai",
            model: "gpt-4o",
        }
    }

    fn create_provider() -> Arc<dyn ApiProvider> {
        Arc::new(OpenAICompletionsProvider::with_client(reqwest::Client::new()))
    }

    async fn mount_function_calling_mocks(
        mock_server: &MockServer,
    ) -> Result<(), Box<dyn std::error::Error>> {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-api-key"))
            .and(body_string_contains(WEATHER_REPORT))
            .and(JsonBody(|body| {
                let messages = body["messages"].as_array().map(Vec::as_slice).unwrap_or_default();
                let call = messages
                    .iter()
                    .find(|m| m["role"] == "assistant")
                    .map(|m| &m["tool_calls"][0]);
                let result = messages.iter().find(|m| m["role"] == "tool");
                call.is_some_and(|c| {
                    c["id"] == "call_abc"
                        && c["type"] == "function"
                        && c["function"]["name"] == "get_weather"
                        && c["function"]["arguments"]
                            .as_str()
                            .and_then(|a| serde_json::from_str::<serde_json::Value>(a).ok())
                            .is_some_and(|a| a["location"] == "Paris")
                }) && result.is_some_and(|r| r["tool_call_id"] == "call_abc")
            }))
            .respond_with(sse("openai/completions_final.sse"))
            .expect(1)
            .mount(mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-api-key"))
            .and(JsonBody(|body| {
                body["model"] == "gpt-4o"
                    && body["stream"] == true
                    && body["stream_options"]["include_usage"] == true
                    && body["messages"][0]["role"] == "system"
                    && body["messages"][1]["content"] == "What's the weather like in Paris?"
                    && body["tools"][0]["type"] == "function"
                    && body["tools"][0]["function"]["name"] == "get_weather"
            }))
            .respond_with(sse("openai/completions_function_call.sse"))
            .expect(1)
            .mount(mock_server)
            .await;

        Ok(())
    }
}

pub struct OpenAIResponsesTestSetup;

#[async_trait::async_trait]
impl ProviderTestSetup for OpenAIResponsesTestSetup {
    fn get_config() -> ProviderConfig {
        ProviderConfig {
            name: "OpenAI Responses",
            provider: "openai",
            model: "gpt-5-mini",
        }
    }

    fn create_provider() -> Arc<dyn ApiProvider> {
        Arc::new(OpenAIResponsesProvider::with_client(reqwest::Client::new()))
    }

    async fn mount_function_calling_mocks(
        mock_server: &MockServer,
    ) -> Result<(), Box<dyn std::error::Error>> {
        Mock::given(method("POST"))
            .and(path("/responses"))
            .and(body_string_contains(WEATHER_REPORT))
            .and(JsonBody(|body| {
                let input = body["input"].as_array().map(Vec::as_slice).unwrap_or_default();
                let call = input.iter().find(|i| i["type"] == "function_call");
                let output = input.iter().find(|i| i["type"] == "function_call_output");
                call.is_some_and(|c| c["call_id"] == "call_abc" && c["name"] == "get_weather")
                    && output.is_some_and(|o| o["call_id"] == "call_abc")
            }))
            .respond_with(sse("openai/responses_final.sse"))
            .expect(1)
            .mount(mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/responses"))
            .and(header("authorization", "Bearer test-api-key"))
            .and(JsonBody(|body| {
                body["model"] == "gpt-5-mini"
                    && body["stream"] == true
                    && body["store"] == false
                    && body["input"][0]["role"] == "developer"
                    && body["reasoning"]["effort"] == "minimal"
                    && body["include"][0] == "reasoning.encrypted_content"
                    && body["tools"][0]["name"] == "get_weather"
            }))
            .respond_with(sse("openai/responses_function_call.sse"))
            .expect(1)
            .mount(mock_server)
            .await;

        Ok(())
    }
}
