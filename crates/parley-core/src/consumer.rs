//! The stream consumer: decode relay frames and apply them to a conversation.

use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use parley_types::frame::FrameDecoder;
use parley_types::{Conversation, StreamEvent};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Prefix marking an assistant turn that holds an error instead of output.
pub const ERROR_PREFIX: &str = "Error: ";

/// Lifecycle of one streamed reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
    /// A `Done` frame arrived.
    Completed,
    /// An `Error` frame arrived.
    Failed,
    /// The reader cancelled.
    Cancelled,
    /// The body ended (or the connection dropped) without a terminal frame.
    Interrupted,
}

impl StreamState {
    pub fn is_finished(self) -> bool {
        !matches!(self, Self::Idle | Self::Streaming)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

/// Cloneable handle that aborts an in-flight read.
///
/// Cancelling only raises a flag; the consumer notices it at its next
/// suspension point or before applying the next event. Cancelling a stream
/// that already finished changes nothing.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Reads one relay response and applies it to a conversation.
///
/// Owns its frame buffer; use a fresh consumer for every request.
pub struct StreamConsumer {
    decoder: FrameDecoder,
    state: StreamState,
    cancel: CancelHandle,
}

impl Default for StreamConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamConsumer {
    pub fn new() -> Self {
        Self::with_cancel(CancelHandle::new())
    }

    /// Use an existing handle, e.g. one already wired to Ctrl+C.
    pub fn with_cancel(cancel: CancelHandle) -> Self {
        Self {
            decoder: FrameDecoder::new(),
            state: StreamState::Idle,
            cancel,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Apply one decoded event to the trailing assistant turn.
    ///
    /// Returns `false` when the event was ignored because the stream is
    /// already finished.
    pub fn apply(&mut self, event: &StreamEvent, conversation: &mut Conversation) -> bool {
        if self.state.is_finished() {
            tracing::debug!(state = %self.state, "ignoring event after stream end");
            return false;
        }
        if self.cancel.is_cancelled() {
            self.state = StreamState::Cancelled;
            return false;
        }

        match event {
            StreamEvent::Token { text } => {
                if !conversation.append_to_assistant(text) {
                    conversation.begin_assistant_turn();
                    conversation.append_to_assistant(text);
                }
                self.state = StreamState::Streaming;
            }
            StreamEvent::Done => {
                self.state = StreamState::Completed;
            }
            StreamEvent::Error {
                message,
                short_message,
            } => {
                tracing::debug!("relay reported error: {message}");
                let text = format!("{ERROR_PREFIX}{short_message}");
                if !conversation.set_assistant_content(text.clone()) {
                    conversation.begin_assistant_turn();
                    conversation.set_assistant_content(text);
                }
                self.state = StreamState::Failed;
            }
        }
        true
    }

    /// Read `body` to its end, applying each event in order, until a
    /// terminal frame, cancellation, or end of input.
    ///
    /// `on_event` sees every event that was applied. A consumer runs once;
    /// calling this again returns the final state without reading.
    pub async fn consume<S, E, F>(
        &mut self,
        body: S,
        conversation: &mut Conversation,
        mut on_event: F,
    ) -> StreamState
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: fmt::Display,
        F: FnMut(&StreamEvent),
    {
        if self.state != StreamState::Idle {
            return self.state;
        }
        self.state = StreamState::Streaming;

        let cancel = self.cancel.token.clone();
        let mut body = std::pin::pin!(body);

        while !self.state.is_finished() {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.state = StreamState::Cancelled;
                    break;
                }
                next = body.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    for event in self.decoder.push(&chunk) {
                        if self.apply(&event, conversation) {
                            on_event(&event);
                        }
                        if self.state.is_finished() {
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!("relay connection dropped: {e}");
                    self.finish_input(conversation, &mut on_event);
                }
                None => self.finish_input(conversation, &mut on_event),
            }
        }

        tracing::debug!(state = %self.state, "stream finished");
        self.state
    }

    /// Flush a trailing frame; a stream still open after that was cut short.
    fn finish_input<F: FnMut(&StreamEvent)>(
        &mut self,
        conversation: &mut Conversation,
        on_event: &mut F,
    ) {
        if let Some(event) = self.decoder.finish() {
            if self.apply(&event, conversation) {
                on_event(&event);
            }
        }
        if !self.state.is_finished() {
            self.state = StreamState::Interrupted;
        }
    }
}
