//! Transport-level behavior shared by every adapter, exercised through Anthropic.

use futures_util::StreamExt;
use platformed_ai::{
    AnthropicProvider, ApiKeyResolver, ApiProvider, AssistantMessageEvent, Context, Error,
    StopReason, StreamOptions,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::providers::{anthropic::AnthropicTestSetup, load_fixture, mock_model, ProviderTestSetup};

async fn setup() -> (MockServer, Arc<dyn ApiProvider>, platformed_ai::Model) {
    let server = MockServer::start().await;
    let model = mock_model(&AnthropicTestSetup::get_config(), &server.uri());
    let provider: Arc<dyn ApiProvider> =
        Arc::new(AnthropicProvider::with_client(reqwest::Client::new()));
    (server, provider, model)
}

fn sse(fixture: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(load_fixture(fixture))
        .insert_header("content-type", "text/event-stream")
}

#[tokio::test]
async fn test_payload_hook_rejection_sends_nothing() {
    let (server, provider, model) = setup().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let options = StreamOptions::new().api_key("test-api-key").on_payload(|model, body| {
        assert_eq!(body["model"], model.id.as_str());
        Err(Error::aborted("blocked by policy"))
    });

    let err = provider
        .stream(&model, &Context::user("hi"), &options)
        .await
        .err()
        .expect("hook must abort the call");
    assert!(matches!(err, Error::Aborted(ref reason) if reason == "blocked by policy"));
}

#[tokio::test]
async fn test_missing_key_is_auth_error() {
    let (server, provider, model) = setup().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = provider
        .stream(&model, &Context::user("hi"), &StreamOptions::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::Auth(_)), "{err}");
}

struct RotatingKey;

#[async_trait::async_trait]
impl ApiKeyResolver for RotatingKey {
    async fn resolve(&self, provider: &str) -> Result<Option<String>, Error> {
        Ok((provider == "anthropic").then(|| "resolved-key".to_string()))
    }
}

#[tokio::test]
async fn test_resolver_key_and_call_headers() {
    let (server, provider, mut model) = setup().await;
    model.headers.insert("x-team".to_string(), "model-default".to_string());
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "resolved-key"))
        .and(header("x-team", "per-call"))
        .respond_with(sse("anthropic/final_response.sse"))
        .expect(1)
        .mount(&server)
        .await;

    let options = StreamOptions::new()
        .api_key_resolver(Arc::new(RotatingKey))
        .header("x-team", "per-call");
    let message = provider
        .stream(&model, &Context::user("hi"), &options)
        .await
        .unwrap()
        .result()
        .await
        .unwrap();
    assert_eq!(message.stop_reason, StopReason::Stop);
}

#[tokio::test]
async fn test_http_error_status_is_provider_error() {
    let (server, provider, model) = setup().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429).set_body_string(
                r#"{"type":"error","error":{"type":"rate_limit_error","message":"slow down"}}"#,
            ),
        )
        .mount(&server)
        .await;

    let err = provider
        .stream(&model, &Context::user("hi"), &StreamOptions::new().api_key("k"))
        .await
        .err()
        .unwrap();
    let Error::Provider { provider, message } = err else {
        panic!("expected provider error");
    };
    assert_eq!(provider, "anthropic");
    assert!(message.contains("429"));
    assert!(message.contains("slow down"));
}

#[tokio::test]
async fn test_error_event_mid_stream_surfaces_on_stream() {
    let (server, provider, model) = setup().await;
    let body = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":5}}}\n\n",
        "event: content_block_start\n",
        "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"Hel\"}}\n\n",
        "event: error\n",
        "data: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
    );
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/event-stream"),
        )
        .mount(&server)
        .await;

    let mut stream = provider
        .stream(&model, &Context::user("hi"), &StreamOptions::new().api_key("k"))
        .await
        .unwrap();

    let mut updates = 0;
    let mut failure = None;
    while let Some(event) = stream.next().await {
        match event {
            Ok(AssistantMessageEvent::ContentUpdate { .. }) => updates += 1,
            Ok(_) => {}
            Err(e) => failure = Some(e),
        }
    }
    assert!(updates >= 1);
    let failure = failure.expect("error event must surface");
    assert!(failure.to_string().contains("Overloaded"));
}

#[tokio::test]
async fn test_cancel_before_response_yields_aborted_message() {
    let (server, provider, model) = setup().await;
    Mock::given(method("POST"))
        .respond_with(sse("anthropic/final_response.sse").set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let signal = CancellationToken::new();
    let trigger = signal.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let options = StreamOptions::new().api_key("k").signal(signal);
    let message = tokio::time::timeout(Duration::from_secs(5), async {
        provider
            .stream(&model, &Context::user("hi"), &options)
            .await
            .unwrap()
            .result()
            .await
            .unwrap()
    })
    .await
    .expect("cancellation must not wait for the server");

    assert_eq!(message.stop_reason, StopReason::Aborted);
    assert!(message.content.is_empty());
}

#[tokio::test]
async fn test_cancel_mid_stream_keeps_partial_content() {
    let (server, provider, model) = setup().await;
    Mock::given(method("POST"))
        .respond_with(sse("anthropic/function_call_response.sse"))
        .mount(&server)
        .await;

    let signal = CancellationToken::new();
    let options = StreamOptions::new().api_key("k").signal(signal.clone());
    let mut stream = provider
        .stream(&model, &Context::user("hi"), &options)
        .await
        .unwrap();

    let mut last = None;
    while let Some(event) = stream.next().await {
        let event = event.unwrap();
        if matches!(event, AssistantMessageEvent::ContentUpdate { .. }) {
            signal.cancel();
        }
        last = Some(event);
    }

    let Some(AssistantMessageEvent::MessageEnd { message }) = last else {
        panic!("stream must still end with MessageEnd");
    };
    assert_eq!(message.stop_reason, StopReason::Aborted);
    assert!(message.tool_calls().next().is_none());
    assert!(message.text().len() < "I'll check the weather in Paris.".len());
}
