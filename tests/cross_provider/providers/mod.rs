pub mod anthropic;
pub mod codex;
pub mod google;
pub mod openai;

use platformed_ai::{ApiProvider, Model, ModelRegistry, StreamOptions, Tool};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::{Match, MockServer, Request};

/// Route crate logs to the test writer; `RUST_LOG=platformed_ai=debug` shows them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Tool result the follow-up mocks key on.
pub const WEATHER_REPORT: &str = "Sunny, 22°C. Perfect weather for sightseeing!";

/// Create a weather function tool for testing
pub fn create_weather_tool() -> Tool {
    Tool::new(
        "get_weather",
        "Get the current weather for a location",
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city and state, e.g. San Francisco, CA"
                }
            },
            "required": ["location"]
        }),
    )
}

/// Load test fixture from file
pub fn load_fixture(filename: &str) -> String {
    let path = format!("{}/tests/cross_provider/fixtures/{filename}", env!("CARGO_MANIFEST_DIR"));
    std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("Failed to load test fixture: {path}"))
}

/// Catalog model pointed at the mock server.
pub fn mock_model(config: &ProviderConfig, base_url: &str) -> Model {
    let mut model = ModelRegistry::builtin()
        .get_model(config.provider, config.model)
        .cloned()
        .unwrap_or_else(|| panic!("{}/{} missing from catalog", config.provider, config.model));
    model.base_url = base_url.to_string();
    model
}

/// Matches requests whose JSON body satisfies a predicate.
pub struct JsonBody(pub fn(&Value) -> bool);

impl Match for JsonBody {
    fn matches(&self, request: &Request) -> bool {
        serde_json::from_slice::<Value>(&request.body)
            .map(|body| (self.0)(&body))
            .unwrap_or(false)
    }
}

/// Provider configuration for cross-provider testing
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: &'static str,
    pub provider: &'static str,
    pub model: &'static str,
}

/// Trait for provider-specific test setup
#[async_trait::async_trait]
pub trait ProviderTestSetup {
    /// Get the provider configuration
    fn get_config() -> ProviderConfig;

    /// Create the adapter under test
    fn create_provider() -> Arc<dyn ApiProvider>;

    /// Per-call options carrying the test credential
    fn options() -> StreamOptions {
        StreamOptions::new().api_key("test-api-key")
    }

    /// Mount the required mocks for function calling test on the provided mock server
    async fn mount_function_calling_mocks(
        mock_server: &MockServer,
    ) -> Result<(), Box<dyn std::error::Error>>;
}
