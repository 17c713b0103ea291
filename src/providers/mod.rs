//! Vendor adapters, one per wire protocol.

pub mod anthropic;
pub mod codex;
pub mod google;
pub mod openai;
pub(crate) mod shared;

pub use anthropic::AnthropicProvider;
pub use codex::{CodexInstructions, CodexProvider};
pub use google::{CloudCodeProvider, GoogleProvider, VertexProvider};
pub use openai::{OpenAICompletionsProvider, OpenAIResponsesProvider};
