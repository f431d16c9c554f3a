//! Offline provider for local development and tests.

use parley_types::provider::{DeltaStream, Provider, ProviderRequest};
use parley_types::{ProviderError, Role};
use std::future::Future;
use std::pin::Pin;

/// Characters per emitted fragment.
const FRAGMENT_CHARS: usize = 4;

/// Echoes the last user message back in small fragments.
///
/// Only the `echo` model exists; anything else is rejected the way a real
/// provider rejects an unknown model.
#[derive(Debug, Clone, Default)]
pub struct DemoProvider;

impl DemoProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Provider for DemoProvider {
    fn stream_text<'a>(
        &'a self,
        request: &'a ProviderRequest,
    ) -> Pin<Box<dyn Future<Output = Result<DeltaStream, ProviderError>> + Send + 'a>> {
        Box::pin(async move {
            if request.model != "echo" {
                return Err(ProviderError::BadRequest {
                    message: format!("unknown demo model '{}'", request.model),
                });
            }

            let last_user = request
                .turns
                .iter()
                .rev()
                .find(|t| t.role == Role::User)
                .map(|t| t.content.as_str())
                .unwrap_or_default();

            let fragments: Vec<Result<String, ProviderError>> =
                fragments(last_user).into_iter().map(Ok).collect();
            Ok(Box::pin(futures_util::stream::iter(fragments)) as DeltaStream)
        })
    }

    fn name(&self) -> &str {
        "demo"
    }
}

/// Split on character boundaries into pieces of at most `FRAGMENT_CHARS`.
fn fragments(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(FRAGMENT_CHARS)
        .map(|c| c.iter().collect())
        .collect()
}
