//! Provider trait for upstream LLM APIs.

use crate::{ChatTurn, ConfigError, ProviderError};
use futures_core::Stream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// A boxed, lazy, non-restartable stream of text deltas from a provider.
///
/// Any item may be an error; callers stop at the first one.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// A parsed `provider:model` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderModelRef {
    pub provider: String,
    pub model: String,
}

impl ProviderModelRef {
    /// Split on the first colon. The provider key is trimmed and lower-cased;
    /// the model identifier is trimmed and otherwise kept verbatim.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidModelRef {
            value: value.to_string(),
        };
        let (provider, model) = value.split_once(':').ok_or_else(invalid)?;
        let provider = provider.trim().to_lowercase();
        let model = model.trim();
        if provider.is_empty() || model.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            provider,
            model: model.to_string(),
        })
    }
}

impl fmt::Display for ProviderModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

/// A provider-neutral streaming request.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub model: String,
    pub turns: Vec<ChatTurn>,
    /// `None` when the model does not accept a sampling temperature.
    pub temperature: Option<f32>,
    pub max_tokens: u32,
}

/// Trait for upstream LLM providers (OpenAI, Anthropic, Gemini, ...).
///
/// Adapters translate the canonical turn list into their native API and
/// reduce the native stream to plain text deltas. Dyn-compatible so the
/// router can hand out `Arc<dyn Provider>`.
pub trait Provider: Send + Sync {
    /// Open a streaming call, returning the text delta stream.
    fn stream_text<'a>(
        &'a self,
        request: &'a ProviderRequest,
    ) -> Pin<Box<dyn Future<Output = Result<DeltaStream, ProviderError>> + Send + 'a>>;

    /// Provider name for logging (e.g., "anthropic").
    fn name(&self) -> &str;
}
