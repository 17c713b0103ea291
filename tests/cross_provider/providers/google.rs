use super::{load_fixture, JsonBody, ProviderConfig, ProviderTestSetup, WEATHER_REPORT};
use platformed_ai::{ApiProvider, CloudCodeProvider, GoogleProvider, StreamOptions, VertexProvider};
use serde_json::Value;
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse(fixture: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(load_fixture(fixture))
        .insert_header("content-type", "text/event-stream")
}

/// The follow-up turn replays the call and answers it in a user turn.
fn replays_tool_round(request: &Value) -> bool {
    let contents = request["contents"].as_array().map(Vec::as_slice).unwrap_or_default();
    contents.len() == 3
        && contents[1]["role"] == "model"
        && contents[1]["parts"]
            .as_array()
            .is_some_and(|parts| {
                parts
                    .iter()
                    .any(|p| p["functionCall"]["args"]["location"] == "Paris")
            })
        && contents[2]["role"] == "user"
        && contents[2]["parts"][0]["functionResponse"]["name"] == "get_weather"
        && contents[2]["parts"][0]["functionResponse"]["response"]["output"] == WEATHER_REPORT
}

fn first_turn(request: &Value) -> bool {
    request["contents"][0]["role"] == "user"
        && request["contents"][0]["parts"][0]["text"] == "What's the weather like in Paris?"
        && request["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .is_some_and(|t| t.contains("weather data"))
        && request["generationConfig"]["maxOutputTokens"] == 150
        && request["tools"][0]["functionDeclarations"][0]["name"] == "get_weather"
}

pub struct GoogleTestSetup;

#[async_trait::async_trait]
impl ProviderTestSetup for GoogleTestSetup {
    fn get_config() -> ProviderConfig {
        ProviderConfig {
            name: "Gemini",
            provider: "google",
            model: "gemini-2.5-flash",
        }
    }

    fn create_provider() -> Arc<dyn ApiProvider> {
        Arc::new(GoogleProvider::with_client(reqwest::Client::new()))
    }

    async fn mount_function_calling_mocks(
        mock_server: &MockServer,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let endpoint = "/models/gemini-2.5-flash:streamGenerateContent";

        Mock::given(method("POST"))
            .and(path(endpoint))
            .and(query_param("alt", "sse"))
            .and(body_string_contains(WEATHER_REPORT))
            .and(JsonBody(replays_tool_round))
            .respond_with(sse("google/final_response.sse"))
            .expect(1)
            .mount(mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path(endpoint))
            .and(query_param("alt", "sse"))
            .and(header("x-goog-api-key", "test-api-key"))
            .and(JsonBody(|body| {
                first_turn(body)
                    && body["generationConfig"]["thinkingConfig"]["thinkingBudget"] == 0
            }))
            .respond_with(sse("google/function_call_response.sse"))
            .expect(1)
            .mount(mock_server)
            .await;

        Ok(())
    }
}

pub struct VertexTestSetup;

#[async_trait::async_trait]
impl ProviderTestSetup for VertexTestSetup {
    fn get_config() -> ProviderConfig {
        ProviderConfig {
            name: "Vertex AI",
            provider: "google-vertex",
            model: "gemini-2.5-pro",
        }
    }

    fn create_provider() -> Arc<dyn ApiProvider> {
        Arc::new(
            VertexProvider::with_client(reqwest::Client::new())
                .with_defaults("test-project", "europe-west1"),
        )
    }

    fn options() -> StreamOptions {
        StreamOptions::new().api_key("test-access-token")
    }

    async fn mount_function_calling_mocks(
        mock_server: &MockServer,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let endpoint = "/v1/projects/test-project/locations/europe-west1/publishers/google/models/gemini-2.5-pro:streamGenerateContent";

        Mock::given(method("POST"))
            .and(path(endpoint))
            .and(body_string_contains(WEATHER_REPORT))
            .and(JsonBody(replays_tool_round))
            .respond_with(sse("google/final_response.sse"))
            .expect(1)
            .mount(mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path(endpoint))
            .and(query_param("alt", "sse"))
            .and(header("authorization", "Bearer test-access-token"))
            .and(JsonBody(first_turn))
            .respond_with(sse("google/function_call_response.sse"))
            .expect(1)
            .mount(mock_server)
            .await;

        Ok(())
    }
}

pub struct CloudCodeTestSetup;

#[async_trait::async_trait]
impl ProviderTestSetup for CloudCodeTestSetup {
    fn get_config() -> ProviderConfig {
        ProviderConfig {
            name: "Cloud Code Assist",
            provider: "google-gemini-cli",
            model: "gemini-2.5-pro",
        }
    }

    fn create_provider() -> Arc<dyn ApiProvider> {
        Arc::new(CloudCodeProvider::with_client(reqwest::Client::new()))
    }

    fn options() -> StreamOptions {
        StreamOptions::new()
            .api_key(r#"{"token":"ya29.test","projectId":"cloud-code-project"}"#)
            .session_id("session-7")
    }

    async fn mount_function_calling_mocks(
        mock_server: &MockServer,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let endpoint = "/v1internal:streamGenerateContent";

        Mock::given(method("POST"))
            .and(path(endpoint))
            .and(body_string_contains(WEATHER_REPORT))
            .and(JsonBody(|body| replays_tool_round(&body["request"])))
            .respond_with(sse("google/cloud_code_final.sse"))
            .expect(1)
            .mount(mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path(endpoint))
            .and(query_param("alt", "sse"))
            .and(header("authorization", "Bearer ya29.test"))
            .and(JsonBody(|body| {
                body["project"] == "cloud-code-project"
                    && body["model"] == "gemini-2.5-pro"
                    && body["userAgent"] == "gemini-cli"
                    && body["requestId"].is_string()
                    && body["request"]["sessionId"] == "session-7"
                    && first_turn(&body["request"])
            }))
            .respond_with(sse("google/cloud_code_function_call.sse"))
            .expect(1)
            .mount(mock_server)
            .await;

        Ok(())
    }
}
