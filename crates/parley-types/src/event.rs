//! The relay's wire-level event.

use crate::error::{ConfigError, ProviderError};

/// One event on a relay stream.
///
/// A stream carries any number of `Token`s followed by at most one terminal
/// event (`Error` or `Done`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A non-empty fragment of assistant output.
    Token { text: String },
    /// Upstream or relay failure.
    Error {
        message: String,
        short_message: String,
    },
    /// Successful completion.
    Done,
}

impl StreamEvent {
    /// Build a token event, or `None` for an empty fragment.
    pub fn token(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if text.is_empty() {
            None
        } else {
            Some(Self::Token { text })
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Done)
    }

    pub fn from_provider_error(err: &ProviderError) -> Self {
        Self::Error {
            message: format!("ProviderError: {err}"),
            short_message: err.short_message().to_string(),
        }
    }

    pub fn from_config_error(err: &ConfigError) -> Self {
        Self::Error {
            message: format!("ConfigError: {err}"),
            short_message: err.short_message().to_string(),
        }
    }
}
