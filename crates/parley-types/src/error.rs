//! Error hierarchy for Parley.
//!
//! Both enums carry a full diagnostic (`Display`) and a short, stable summary
//! meant for the person reading the chat. The relay sends both in an error
//! frame.

use thiserror::Error;

/// Errors raised while talking to an upstream LLM provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Server overloaded")]
    Overloaded,

    #[error("Server error: {status} {message}")]
    Server { status: u16, message: String },

    #[error("Upstream error: {message}")]
    Upstream { message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Stream parse error: {0}")]
    StreamParse(String),

    #[error("Request timeout")]
    Timeout,
}

impl ProviderError {
    /// A one-line summary suitable for showing in place of the assistant reply.
    pub fn short_message(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "The provider rejected the API key.",
            Self::BadRequest { .. } => "The provider rejected the request.",
            Self::RateLimited { .. } => "Rate limited by the provider. Try again shortly.",
            Self::Overloaded => "The provider is overloaded. Try again shortly.",
            Self::Server { .. } => "The provider returned a server error.",
            Self::Upstream { .. } => "The provider reported an error mid-response.",
            Self::Network(_) => "Could not reach the provider.",
            Self::StreamParse(_) => "The provider sent a malformed response.",
            Self::Timeout => "The provider took too long to respond.",
        }
    }
}

/// Errors from configuration loading and model routing.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file parse error at {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Missing required configuration: {key}")]
    MissingKey { key: String },

    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("Model must be like 'provider:model_name', got '{value}'")]
    InvalidModelRef { value: String },

    #[error("Unknown provider: {provider}")]
    UnknownProvider { provider: String },

    #[error("Unsupported model: {model}")]
    UnsupportedModel { model: String },
}

impl ConfigError {
    pub fn short_message(&self) -> &'static str {
        match self {
            Self::MissingKey { .. } => "The server is missing credentials for this provider.",
            Self::InvalidModelRef { .. } | Self::UnknownProvider { .. } => {
                "The selected model is not available."
            }
            Self::UnsupportedModel { .. } => "The selected model is not enabled on this server.",
            Self::Parse { .. } | Self::InvalidValue { .. } => "The server is misconfigured.",
        }
    }
}
