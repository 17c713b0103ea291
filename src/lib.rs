//! One conversation model over many LLM vendor wire formats.
//!
//! Callers build a [`Context`] (system prompt, history, tools), pick a
//! [`Model`] from the [`ModelRegistry`] and call [`Client::stream`]. The
//! matching adapter repairs the history for that vendor, sends one
//! streaming request and normalizes the reply into
//! [`AssistantMessageEvent`]s. Supported protocols: Anthropic Messages,
//! OpenAI Chat Completions (plus compatible vendors), OpenAI Responses,
//! ChatGPT Codex, Gemini, Vertex AI and Cloud Code Assist.
//!
//! ```no_run
//! use futures_util::StreamExt;
//! use platformed_ai::{AssistantMessageEvent, Client, ContentDelta, Context, StreamOptions};
//!
//! # async fn run() -> Result<(), platformed_ai::Error> {
//! let client = Client::builtin()?;
//! let model = client.get_model("openai", "gpt-5-mini").cloned().unwrap();
//! let options = StreamOptions::new().api_key("sk-...");
//!
//! let mut stream = client.stream(&model, &Context::user("Hi!"), &options).await?;
//! while let Some(event) = stream.next().await {
//!     if let AssistantMessageEvent::ContentUpdate {
//!         delta: ContentDelta::Text { text },
//!         ..
//!     } = event?
//!     {
//!         print!("{text}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod accumulator;
pub mod api_registry;
pub mod attachments;
pub mod catalog;
pub mod error;
pub mod history;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod response;
pub mod sse_stream;
pub mod thinking;
pub mod types;
pub mod validation;

// Re-export core types for easy usage
pub use accumulator::MessageBuilder;
pub use api_registry::{ApiRegistry, Client};
pub use attachments::{sanitize_images, ImageLimitOverrides, SanitizeConfig, Sanitized};
pub use error::Error;
pub use history::{transform_messages, transform_messages_with, MessageExtensions};
pub use provider::ApiProvider;
pub use providers::*;
pub use registry::{calculate_cost, supports_xhigh, ModelRegistry};
pub use response::AssistantStream;
pub use sse_stream::SseEvent;
pub use thinking::ThinkingTagParser;
pub use types::*;
pub use validation::{validate_tool_call, ToolValidator};
