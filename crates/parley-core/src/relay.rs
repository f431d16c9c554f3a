//! The stream producer: one upstream call re-emitted as relay frames.

use async_stream::stream;
use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use parley_api::ProviderRegistry;
use parley_types::{Attachment, ChatTurn, ProviderError, Role, StreamEvent, frame};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Per-server relay settings.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub max_tokens: u32,
    /// Bound on connecting and on each wait for the next delta. `None`
    /// waits forever.
    pub idle_timeout: Option<Duration>,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            idle_timeout: Some(Duration::from_secs(120)),
        }
    }
}

/// One turn to relay.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    /// A `provider:model` reference.
    pub model: String,
    /// Caller override; wins over the per-model table.
    pub temperature: Option<f32>,
    pub turns: Vec<ChatTurn>,
    pub attachments: Vec<Attachment>,
}

/// Drives upstream calls and converts their output to [`StreamEvent`]s.
///
/// Each call to [`Relay::events`] is an independent producer; the only state
/// shared between them is the read-only registry.
#[derive(Clone)]
pub struct Relay {
    registry: Arc<ProviderRegistry>,
    options: RelayOptions,
}

impl Relay {
    pub fn new(registry: Arc<ProviderRegistry>, options: RelayOptions) -> Self {
        Self { registry, options }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// The events for one request: zero or more `Token`s, then exactly one
    /// `Done` or `Error`.
    ///
    /// Nothing happens until the stream is polled, and the upstream is only
    /// read as fast as the stream is consumed.
    pub fn events(&self, request: RelayRequest) -> impl Stream<Item = StreamEvent> + Send + 'static {
        let registry = Arc::clone(&self.registry);
        let options = self.options.clone();

        stream! {
            let route = match registry.resolve(&request.model, request.temperature) {
                Ok(route) => route,
                Err(e) => {
                    tracing::warn!(model = %request.model, "routing failed: {e}");
                    yield StreamEvent::from_config_error(&e);
                    return;
                }
            };

            let turns = fold_attachments(request.turns, &request.attachments);
            let provider_request = route.request(turns, options.max_tokens);
            tracing::debug!(
                model = %route.model_ref,
                turns = provider_request.turns.len(),
                temperature = ?provider_request.temperature,
                "opening upstream stream"
            );

            let opened = within(
                options.idle_timeout,
                route.provider.stream_text(&provider_request),
            )
            .await;
            let mut deltas = match opened.and_then(|r| r) {
                Ok(deltas) => deltas,
                Err(e) => {
                    tracing::warn!(model = %route.model_ref, "upstream call failed: {e}");
                    yield StreamEvent::from_provider_error(&e);
                    return;
                }
            };

            let mut tokens = 0usize;
            loop {
                match within(options.idle_timeout, deltas.next()).await {
                    Ok(Some(Ok(text))) => {
                        if let Some(event) = StreamEvent::token(text) {
                            tokens += 1;
                            yield event;
                        }
                    }
                    Ok(Some(Err(e))) | Err(e) => {
                        tracing::warn!(model = %route.model_ref, tokens, "upstream stream failed: {e}");
                        yield StreamEvent::from_provider_error(&e);
                        return;
                    }
                    Ok(None) => {
                        tracing::info!(model = %route.model_ref, tokens, "stream completed");
                        yield StreamEvent::Done;
                        return;
                    }
                }
            }
        }
    }

    /// [`Relay::events`] encoded as wire frames.
    pub fn frames(&self, request: RelayRequest) -> impl Stream<Item = Bytes> + Send + 'static {
        self.events(request)
            .map(|event| Bytes::from(frame::encode(&event)))
    }
}

/// Await `fut`, failing with [`ProviderError::Timeout`] once `limit` elapses.
async fn within<F: Future>(limit: Option<Duration>, fut: F) -> Result<F::Output, ProviderError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ProviderError::Timeout),
        None => Ok(fut.await),
    }
}

/// Append text attachments to the last user turn as fenced blocks.
///
/// A conversation without a user turn gets one holding just the attachments.
pub fn fold_attachments(mut turns: Vec<ChatTurn>, attachments: &[Attachment]) -> Vec<ChatTurn> {
    if attachments.is_empty() {
        return turns;
    }

    let mut blocks = String::new();
    for attachment in attachments {
        if !blocks.is_empty() {
            blocks.push_str("\n\n");
        }
        blocks.push_str(&format!(
            "Attached file `{}`:\n```\n{}\n```",
            attachment.name,
            attachment.content.trim_end_matches('\n')
        ));
    }

    match turns.iter_mut().rev().find(|t| t.role == Role::User) {
        Some(turn) if turn.content.trim().is_empty() => turn.content = blocks,
        Some(turn) => {
            turn.content.push_str("\n\n");
            turn.content.push_str(&blocks);
        }
        None => turns.push(ChatTurn::user(blocks)),
    }
    turns
}
