//! OpenAI wire protocols: Chat Completions (and compatible servers) and Responses.

pub mod compat;
pub mod completions;
pub mod completions_types;
pub mod reasoning;
pub mod responses;
pub mod responses_types;

pub use completions::OpenAICompletionsProvider;
pub use reasoning::{resolve_effort, Effort};
pub use responses::OpenAIResponsesProvider;
