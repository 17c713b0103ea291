use futures_util::StreamExt;
use platformed_ai::{AssistantMessageEvent, Content, ContentDelta, Context, StopReason};
use wiremock::MockServer;

use super::providers::{
    anthropic::AnthropicTestSetup,
    codex::CodexTestSetup,
    create_weather_tool,
    google::{CloudCodeTestSetup, GoogleTestSetup, VertexTestSetup},
    init_tracing, mock_model,
    openai::{OpenAICompletionsTestSetup, OpenAIResponsesTestSetup},
    ProviderTestSetup, WEATHER_REPORT,
};

/// Run the function calling e2e test for a specific provider
async fn run_function_calling_test<T: ProviderTestSetup>() -> Result<(), Box<dyn std::error::Error>>
{
    init_tracing();
    let config = T::get_config();
    let mock_server = MockServer::start().await;
    T::mount_function_calling_mocks(&mock_server).await?;

    let provider = T::create_provider();
    let model = mock_model(&config, &mock_server.uri());
    let options = T::options().temperature(0.7).max_tokens(150);

    // Step 1: the model asks for the weather tool
    let conversation = Context::system(
        "You have access to weather data. Use the get_weather function when asked about weather.",
    )
    .with_user("What's the weather like in Paris?")
    .with_tools(vec![create_weather_tool()]);

    let mut stream = provider.stream(&model, &conversation, &options).await?;
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event?);
    }

    assert!(
        matches!(events.first(), Some(AssistantMessageEvent::MessageStart { .. })),
        "{}: stream must open with MessageStart",
        config.name
    );
    assert!(
        events.iter().any(|e| matches!(
            e,
            AssistantMessageEvent::ContentUpdate {
                delta: ContentDelta::ToolCallStart { name, .. },
                ..
            } if name == "get_weather"
        )),
        "{}: no tool call start",
        config.name
    );
    let Some(AssistantMessageEvent::MessageEnd { message: first }) = events.last() else {
        panic!("{}: stream must close with MessageEnd", config.name);
    };
    assert_eq!(
        events.iter().filter(|e| e.is_terminal()).count(),
        1,
        "{}: exactly one MessageEnd",
        config.name
    );

    assert_eq!(first.stop_reason, StopReason::ToolUse, "{}", config.name);
    assert_eq!(first.provider, config.provider);
    assert_eq!(first.model, config.model);
    assert!(first.text().contains("weather"), "{}: {:?}", config.name, first.text());
    assert!(first.usage.input > 0, "{}: usage not reported", config.name);

    let call = first.tool_calls().next().expect("tool call").clone();
    assert_eq!(call.name, "get_weather");
    assert_eq!(call.arguments["location"], "Paris");
    assert!(!call.id.is_empty());

    // Step 2: answer the tool call and let the model finish
    let conversation = conversation
        .with_response(first)
        .with_tool_result(&call.id, &call.name, WEATHER_REPORT);

    let second = provider
        .stream(&model, &conversation, &options)
        .await?
        .result()
        .await?;

    assert_eq!(second.stop_reason, StopReason::Stop, "{}", config.name);
    assert_eq!(second.text(), "It's sunny in Paris, 22°C.", "{}", config.name);
    assert!(second.tool_calls().next().is_none());
    assert!(second.content.iter().all(|c| matches!(c, Content::Text(_))));
    assert!(
        (second.usage.cost.total - (second.usage.cost.input
            + second.usage.cost.output
            + second.usage.cost.cache_read
            + second.usage.cost.cache_write))
            .abs()
            < 1e-12
    );

    // Mock expectations (one request per turn) are verified on drop.
    Ok(())
}

#[tokio::test]
async fn test_anthropic_function_calling() {
    run_function_calling_test::<AnthropicTestSetup>().await.unwrap();
}

#[tokio::test]
async fn test_openai_completions_function_calling() {
    run_function_calling_test::<OpenAICompletionsTestSetup>().await.unwrap();
}

#[tokio::test]
async fn test_openai_responses_function_calling() {
    run_function_calling_test::<OpenAIResponsesTestSetup>().await.unwrap();
}

#[tokio::test]
async fn test_codex_function_calling() {
    run_function_calling_test::<CodexTestSetup>().await.unwrap();
}

#[tokio::test]
async fn test_gemini_function_calling() {
    run_function_calling_test::<GoogleTestSetup>().await.unwrap();
}

#[tokio::test]
async fn test_vertex_function_calling() {
    run_function_calling_test::<VertexTestSetup>().await.unwrap();
}

#[tokio::test]
async fn test_cloud_code_function_calling() {
    run_function_calling_test::<CloudCodeTestSetup>().await.unwrap();
}
