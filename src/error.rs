use thiserror::Error;

/// Errors that can occur when using the platformed-ai library.
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Streaming error: {0}")]
    Streaming(String),

    #[error("Missing bundled asset: {asset}")]
    MissingAsset { asset: String },

    #[error("Invalid arguments for tool \"{tool}\": {}", .errors.join("; "))]
    ToolValidation {
        tool: String,
        /// One `path: message` entry per failing field.
        errors: Vec<String>,
        arguments: serde_json::Value,
    },

    /// The payload hook rejected the request; nothing was sent.
    #[error("Request aborted before it was sent: {0}")]
    Aborted(String),

    #[error("No provider registered for api: {0}")]
    UnsupportedApi(String),
}

impl Error {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Error::Auth(message.into())
    }

    pub fn streaming(message: impl Into<String>) -> Self {
        Error::Streaming(message.into())
    }

    pub fn missing_asset(asset: impl Into<String>) -> Self {
        Error::MissingAsset {
            asset: asset.into(),
        }
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        Error::Aborted(reason.into())
    }
}
