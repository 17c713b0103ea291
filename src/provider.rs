//! The provider seam and the request/stream pipeline shared by every vendor.

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::accumulator::MessageBuilder;
use crate::attachments::{sanitize_images, SanitizeConfig};
use crate::history::{transform_messages, transform_messages_with};
use crate::sse_stream::{SseEvent, SseStreamExt};
use crate::types::{Api, AssistantMessageEvent, Content, Context, Model, StreamOptions};
use crate::{AssistantStream, Error};

/// A vendor wire protocol.
///
/// Implementations turn a vendor-agnostic [`Context`] into one HTTP request
/// and the vendor's event stream back into [`AssistantMessageEvent`]s.
#[async_trait::async_trait]
pub trait ApiProvider: Send + Sync + 'static {
    /// The API this provider serves.
    fn api(&self) -> Api;

    /// Send one request and stream the reply.
    ///
    /// Errors before the first byte (bad options, rejected payload, HTTP
    /// status) are returned here; later failures arrive on the stream.
    async fn stream(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> Result<AssistantStream, Error>;
}

/// What the driver should do after a decoded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Done,
}

/// Per-request state machine translating vendor SSE events into deltas.
pub(crate) trait StreamDecoder: Send + 'static {
    fn decode(&mut self, event: SseEvent, message: &mut MessageBuilder) -> Result<Flow, Error>;

    /// Called once after the transport ends without error.
    fn finish(&mut self, message: &mut MessageBuilder) -> Result<(), Error> {
        message.close_open_tool_calls()
    }
}

/// Shared HTTP client settings. No overall timeout: streams can run long.
pub(crate) fn http_client() -> Result<reqwest::Client, Error> {
    Ok(reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .build()?)
}

/// Repair history and fit attachments to the vendor before building a body.
pub(crate) fn prepare_context(
    model: &Model,
    context: &Context,
    options: &StreamOptions,
) -> Context {
    let repaired = match &options.extensions {
        Some(extensions) => transform_messages_with(&context.messages, model, extensions),
        None => transform_messages(&context.messages, model),
    };

    let config = SanitizeConfig::for_model(model).apply(&options.image_limits);
    let sanitized = sanitize_images(&repaired, &config);
    if let Some(note) = &sanitized.note {
        tracing::debug!(provider = %model.provider, model = %model.id, %note, "sanitized images");
    }
    context.with_messages(sanitized.messages)
}

/// Replace attachments the model cannot read with a text marker.
pub(crate) fn strip_unsupported_input(model: &Model, content: &[Content]) -> Vec<Content> {
    use crate::types::InputModality;

    content
        .iter()
        .map(|block| match block {
            Content::Image(_) if !model.accepts(InputModality::Image) => {
                Content::text("(image omitted: model does not support images)")
            }
            Content::Document(doc) if !model.accepts(InputModality::Document) => Content::text(
                format!("(document {} omitted: model does not support documents)", doc.file_name),
            ),
            other => other.clone(),
        })
        .collect()
}

/// Serialize the vendor body and hand it to the caller's inspection hook.
/// Any rejection by the hook surfaces as [`Error::Aborted`].
pub(crate) fn check_payload<B: Serialize>(
    model: &Model,
    options: &StreamOptions,
    body: &B,
) -> Result<serde_json::Value, Error> {
    let value = serde_json::to_value(body)?;
    if let Some(hook) = &options.on_payload {
        hook(model, &value).map_err(|e| match e {
            Error::Aborted(reason) => Error::Aborted(reason),
            other => Error::aborted(other.to_string()),
        })?;
    }
    Ok(value)
}

/// Model headers first, then per-call headers on top. Either replaces a
/// header the adapter already set.
pub(crate) fn with_headers(
    request: reqwest::RequestBuilder,
    model: &Model,
    options: &StreamOptions,
) -> reqwest::RequestBuilder {
    let mut headers = HeaderMap::new();
    for (name, value) in model.headers.iter().chain(options.headers.iter()) {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "skipping invalid header"),
        }
    }
    request.headers(headers)
}

/// Send the request unless the call is cancelled first.
///
/// `Ok(None)` means the signal fired before the response arrived.
pub(crate) async fn send(
    provider: &str,
    request: reqwest::RequestBuilder,
    signal: &CancellationToken,
) -> Result<Option<reqwest::Response>, Error> {
    let response = tokio::select! {
        biased;
        _ = signal.cancelled() => return Ok(None),
        response = request.send() => response?,
    };

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(Error::provider(
            provider,
            format!("API error ({status}): {error_text}"),
        ));
    }
    Ok(Some(response))
}

enum Step {
    Cancelled,
    Next(Option<Result<SseEvent, Error>>),
}

/// Drive a vendor stream through `decoder` into unified events.
///
/// Emits `MessageStart`, the decoder's content updates, then `MessageEnd`.
/// Cancellation drops the transport and ends with an `aborted` message that
/// keeps everything received so far.
pub(crate) fn drive<D: StreamDecoder>(
    model: Model,
    response: Option<reqwest::Response>,
    mut decoder: D,
    signal: CancellationToken,
) -> AssistantStream {
    let stream = async_stream::stream! {
        let mut builder = MessageBuilder::new(&model);
        yield Ok(builder.start_event());

        let mut events = match response {
            Some(response) => response.bytes_stream().sse_events(),
            None => {
                let message = builder.abort(&model);
                yield Ok(AssistantMessageEvent::MessageEnd { message });
                return;
            }
        };

        loop {
            let step = tokio::select! {
                biased;
                _ = signal.cancelled() => Step::Cancelled,
                next = events.next() => Step::Next(next),
            };

            match step {
                Step::Cancelled => {
                    tracing::debug!(
                        provider = %model.provider,
                        model = %model.id,
                        "stream cancelled"
                    );
                    if let Err(e) = builder.close_open_tool_calls() {
                        tracing::warn!(error = %e, "could not close tool calls on abort");
                    }
                    let pending: Vec<_> = builder.drain_events().collect();
                    for event in pending {
                        yield Ok(event);
                    }
                    let message = builder.abort(&model);
                    yield Ok(AssistantMessageEvent::MessageEnd { message });
                    return;
                }
                Step::Next(None) => break,
                Step::Next(Some(Err(e))) => {
                    yield Err(e);
                    return;
                }
                Step::Next(Some(Ok(event))) => {
                    let flow = decoder.decode(event, &mut builder);
                    let pending: Vec<_> = builder.drain_events().collect();
                    for event in pending {
                        yield Ok(event);
                    }
                    match flow {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Done) => break,
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }
        }

        // Release the connection before the final bookkeeping.
        drop(events);

        if let Err(e) = decoder.finish(&mut builder) {
            yield Err(e);
            return;
        }
        let pending: Vec<_> = builder.drain_events().collect();
        for event in pending {
            yield Ok(event);
        }
        let message = builder.finish(&model);
        yield Ok(AssistantMessageEvent::MessageEnd { message });
    };

    AssistantStream::from_stream(stream)
}

/// Parse one SSE data payload, naming the vendor on failure.
pub(crate) fn parse_event<T: serde::de::DeserializeOwned>(
    provider: &str,
    event: &SseEvent,
) -> Result<T, Error> {
    serde_json::from_str(&event.data).map_err(|e| {
        Error::provider(provider, format!("Failed to parse SSE event: {e}"))
    })
}

/// Text-only content flattened to one string, `None` if any block is not text.
pub(crate) fn text_only(content: &[Content]) -> Option<String> {
    let mut out = String::new();
    for block in content {
        out.push_str(block.as_text()?);
    }
    Some(out)
}
