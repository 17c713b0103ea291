//! The unified event stream handed back to callers.

use futures_util::stream::Stream;
use futures_util::StreamExt;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::types::{AssistantMessage, AssistantMessageEvent};
use crate::Error;

type EventStream = Pin<Box<dyn Stream<Item = Result<AssistantMessageEvent, Error>> + Send>>;

/// Stream of [`AssistantMessageEvent`]s for one call.
///
/// Poll it for live updates, or call [`result`](Self::result) to wait for the
/// final message. Both can be combined: `result` drains whatever is left.
pub struct AssistantStream {
    stream: EventStream,
    final_message: Option<AssistantMessage>,
}

impl AssistantStream {
    /// Create a new stream from unified events.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<AssistantMessageEvent, Error>> + Send + 'static,
    {
        Self {
            stream: Box::pin(stream),
            final_message: None,
        }
    }

    /// The final message, once `MessageEnd` has been observed.
    pub fn final_message(&self) -> Option<&AssistantMessage> {
        self.final_message.as_ref()
    }

    /// Consume the remaining events and return the final message.
    pub async fn result(mut self) -> Result<AssistantMessage, Error> {
        while let Some(event) = self.next().await {
            event?;
        }
        self.final_message
            .ok_or_else(|| Error::streaming("stream ended without a final message"))
    }

    /// Get just the text content (convenience method).
    pub async fn text(self) -> Result<String, Error> {
        Ok(self.result().await?.text())
    }
}

impl Stream for AssistantStream {
    type Item = Result<AssistantMessageEvent, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.final_message.is_some() {
            return Poll::Ready(None);
        }
        let polled = self.stream.poll_next_unpin(cx);
        if let Poll::Ready(Some(Ok(AssistantMessageEvent::MessageEnd { message }))) = &polled {
            self.final_message = Some(message.clone());
        }
        polled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Api, Content, ContentDelta, StopReason, Usage};

    fn message(content: Vec<Content>) -> AssistantMessage {
        AssistantMessage {
            content,
            api: Api::OpenAIResponses,
            provider: "openai".to_string(),
            model: "gpt-5".to_string(),
            usage: Usage::default(),
            stop_reason: StopReason::Stop,
            error_message: None,
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn test_result_drains_stream() {
        let events = vec![
            Ok(AssistantMessageEvent::MessageStart {
                message: message(vec![]),
            }),
            Ok(AssistantMessageEvent::ContentUpdate {
                index: 0,
                delta: ContentDelta::Text {
                    text: "Test response".to_string(),
                },
            }),
            Ok(AssistantMessageEvent::MessageEnd {
                message: message(vec![Content::text("Test response")]),
            }),
        ];

        let stream = AssistantStream::from_stream(futures_util::stream::iter(events));
        assert_eq!(stream.text().await.unwrap(), "Test response");
    }

    #[tokio::test]
    async fn test_stream_stops_after_message_end() {
        let events = vec![
            Ok(AssistantMessageEvent::MessageEnd {
                message: message(vec![]),
            }),
            Err(Error::streaming("never observed")),
        ];

        let mut stream = AssistantStream::from_stream(futures_util::stream::iter(events));
        assert!(stream.next().await.unwrap().unwrap().is_terminal());
        assert!(stream.next().await.is_none());
        assert!(stream.final_message().is_some());
    }

    #[tokio::test]
    async fn test_error_surfaces_from_result() {
        let events = vec![
            Ok(AssistantMessageEvent::MessageStart {
                message: message(vec![]),
            }),
            Err(Error::provider("openai", "overloaded")),
        ];

        let stream = AssistantStream::from_stream(futures_util::stream::iter(events));
        let err = stream.result().await.unwrap_err();
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_missing_end_is_an_error() {
        let events = vec![Ok(AssistantMessageEvent::MessageStart {
            message: message(vec![]),
        })];
        let stream = AssistantStream::from_stream(futures_util::stream::iter(events));
        assert!(stream.result().await.is_err());
    }
}
