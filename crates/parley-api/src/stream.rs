//! Async stream that reduces a provider's SSE body to text deltas.

use bytes::Bytes;
use futures_core::Stream;
use parley_types::ProviderError;
use parley_types::sse::{SseEvent, SseParser};
use pin_project_lite::pin_project;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

/// What a provider-specific extractor found in one SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    /// A fragment of assistant text.
    Text(String),
    /// Nothing relevant (pings, metadata, usage).
    Skip,
    /// The provider's explicit end-of-stream marker.
    End,
}

/// Maps one SSE event of a vendor protocol to a [`Delta`].
pub type DeltaExtractor = fn(&SseEvent) -> Result<Delta, ProviderError>;

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

pin_project! {
    /// A stream of text deltas decoded from an upstream SSE response.
    ///
    /// Ends after the extractor reports [`Delta::End`] or after the first
    /// error. When `require_end` is set, a body that closes without the end
    /// marker yields an error instead of a clean end.
    pub struct SseDeltaStream {
        #[pin]
        inner: ByteStream,
        parser: SseParser,
        pending: VecDeque<SseEvent>,
        extract: DeltaExtractor,
        require_end: bool,
        eof: bool,
        finished: bool,
    }
}

impl SseDeltaStream {
    pub fn new(
        byte_stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
        extract: DeltaExtractor,
        require_end: bool,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            parser: SseParser::new(),
            pending: VecDeque::new(),
            extract,
            require_end,
            eof: false,
            finished: false,
        }
    }
}

impl Stream for SseDeltaStream {
    type Item = Result<String, ProviderError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if *this.finished {
                return Poll::Ready(None);
            }

            // Drain events parsed from earlier chunks first
            while let Some(event) = this.pending.pop_front() {
                match (this.extract)(&event) {
                    Ok(Delta::Text(text)) if !text.is_empty() => {
                        return Poll::Ready(Some(Ok(text)));
                    }
                    Ok(Delta::Text(_)) | Ok(Delta::Skip) => continue,
                    Ok(Delta::End) => {
                        *this.finished = true;
                        return Poll::Ready(None);
                    }
                    Err(e) => {
                        *this.finished = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                }
            }

            if *this.eof {
                *this.finished = true;
                if *this.require_end {
                    return Poll::Ready(Some(Err(ProviderError::StreamParse(
                        "stream ended before the completion marker".into(),
                    ))));
                }
                return Poll::Ready(None);
            }

            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(bytes)) => this.pending.extend(this.parser.feed(&bytes)),
                Some(Err(e)) => {
                    *this.finished = true;
                    let err = if e.is_timeout() {
                        ProviderError::Timeout
                    } else {
                        ProviderError::Network(e.to_string())
                    };
                    return Poll::Ready(Some(Err(err)));
                }
                None => {
                    *this.eof = true;
                    this.pending.extend(this.parser.finish());
                }
            }
        }
    }
}
