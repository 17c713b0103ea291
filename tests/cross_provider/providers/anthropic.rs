use super::{load_fixture, JsonBody, ProviderConfig, ProviderTestSetup, WEATHER_REPORT};
use platformed_ai::{AnthropicProvider, ApiProvider};
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct AnthropicTestSetup;

#[async_trait::async_trait]
impl ProviderTestSetup for AnthropicTestSetup {
    fn get_config() -> ProviderConfig {
        ProviderConfig {
            name: "Anthropic",
            provider: "anthropic",
            model: "claude-sonnet-4-5",
        }
    }

    fn create_provider() -> Arc<dyn ApiProvider> {
        Arc::new(AnthropicProvider::with_client(reqwest::Client::new()))
    }

    async fn mount_function_calling_mocks(
        mock_server: &MockServer,
    ) -> Result<(), Box<dyn std::error::Error>> {
        // Follow-up first: it is the more specific of the two.
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-api-key"))
            .and(body_string_contains(WEATHER_REPORT))
            .and(JsonBody(|body| {
                let messages = body["messages"].as_array().map(Vec::as_slice).unwrap_or_default();
                messages.len() == 3
                    && messages[1]["role"] == "assistant"
                    && messages[1]["content"][1]["type"] == "tool_use"
                    && messages[1]["content"][1]["id"] == "toolu_123456"
                    && messages[1]["content"][1]["input"]["location"] == "Paris"
                    && messages[2]["role"] == "user"
                    && messages[2]["content"][0]["type"] == "tool_result"
                    && messages[2]["content"][0]["tool_use_id"] == "toolu_123456"
            }))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(load_fixture("anthropic/final_response.sse"))
                    .insert_header("content-type", "text/event-stream"),
            )
            .expect(1)
            .mount(mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-api-key"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(JsonBody(|body| {
                body["model"] == "claude-sonnet-4-5"
                    && body["stream"] == true
                    && body["max_tokens"] == 150
                    && body["system"][0]["text"]
                        .as_str()
                        .is_some_and(|s| s.contains("weather data"))
                    && body["tools"][0]["name"] == "get_weather"
                    && body["tools"][0]["input_schema"]["required"][0] == "location"
                    && body["messages"][0]["role"] == "user"
            }))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(load_fixture("anthropic/function_call_response.sse"))
                    .insert_header("content-type", "text/event-stream"),
            )
            .expect(1)
            .mount(mock_server)
            .await;

        Ok(())
    }
}
