//! Relay frame codec.
//!
//! Each [`StreamEvent`] travels as one SSE block, `data: <json>\n\n`, with one
//! of three payload shapes:
//!
//! - `{"t": "..."}` for a token
//! - `{"error": "...", "error_short": "..."}` for an error (`error_short` is
//!   optional when decoding)
//! - `{"done": true}` for completion
//!
//! Payloads that do not match one of these shapes are dropped by the decoder
//! instead of failing the stream.

use crate::StreamEvent;
use crate::sse::SseParser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    t: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_short: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    done: Option<bool>,
}

/// Encode an event as a complete frame.
pub fn encode(event: &StreamEvent) -> String {
    let wire = match event {
        StreamEvent::Token { text } => WireFrame {
            t: Some(text.clone()),
            ..WireFrame::default()
        },
        StreamEvent::Error {
            message,
            short_message,
        } => WireFrame {
            error: Some(message.clone()),
            error_short: Some(short_message.clone()),
            ..WireFrame::default()
        },
        StreamEvent::Done => WireFrame {
            done: Some(true),
            ..WireFrame::default()
        },
    };
    // A struct of strings and bools always serializes.
    let json = serde_json::to_string(&wire).unwrap_or_default();
    format!("data: {json}\n\n")
}

/// Decode the joined `data:` payload of one frame.
pub fn decode_payload(data: &str) -> Option<StreamEvent> {
    let wire: WireFrame = match serde_json::from_str(data) {
        Ok(wire) => wire,
        Err(e) => {
            tracing::debug!("Discarding malformed frame: {e}");
            return None;
        }
    };

    if let Some(message) = wire.error {
        let short_message = wire.error_short.unwrap_or_else(|| message.clone());
        return Some(StreamEvent::Error {
            message,
            short_message,
        });
    }
    if let Some(text) = wire.t {
        return StreamEvent::token(text);
    }
    if wire.done == Some(true) {
        return Some(StreamEvent::Done);
    }

    tracing::debug!("Discarding frame with unrecognized shape: {data}");
    None
}

/// Incremental frame decoder: bytes in, events out.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    parser: SseParser,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the events of every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.parser
            .feed(chunk)
            .into_iter()
            .filter_map(|sse| decode_payload(&sse.data))
            .collect()
    }

    /// Decode any trailing frame left once the byte source reports end of input.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        self.parser
            .finish()
            .and_then(|sse| decode_payload(&sse.data))
    }
}
