//! Anthropic Messages API adapter.

use crate::http::open_stream;
use crate::stream::{Delta, SseDeltaStream};
use parley_types::provider::{DeltaStream, Provider, ProviderRequest};
use parley_types::sse::SseEvent;
use parley_types::{ProviderError, Role};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// The Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone)]
pub struct AnthropicProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(
        http: reqwest::Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Provider for AnthropicProvider {
    fn stream_text<'a>(
        &'a self,
        request: &'a ProviderRequest,
    ) -> Pin<Box<dyn Future<Output = Result<DeltaStream, ProviderError>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}/v1/messages", self.base_url);
            tracing::debug!(model = %request.model, "POST {url}");

            let builder = self
                .http
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&build_body(request));

            let response = open_stream(self.name(), builder).await?;
            let stream = SseDeltaStream::new(response.bytes_stream(), extract_delta, true);
            Ok(Box::pin(stream) as DeltaStream)
        })
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

/// System turns move to the top-level `system` field; the rest stay in order.
fn build_body(request: &ProviderRequest) -> MessagesRequest<'_> {
    let mut system_parts = Vec::new();
    let mut messages = Vec::new();
    for turn in &request.turns {
        match turn.role {
            Role::System => {
                if !turn.content.is_empty() {
                    system_parts.push(turn.content.as_str());
                }
            }
            Role::User | Role::Assistant => messages.push(WireMessage {
                role: turn.role,
                content: &turn.content,
            }),
        }
    }

    let system = system_parts.join("\n\n").trim().to_string();
    MessagesRequest {
        model: &request.model,
        max_tokens: request.max_tokens,
        messages,
        system: (!system.is_empty()).then_some(system),
        temperature: request.temperature,
        stream: true,
    }
}

/// Map one Messages API SSE event to a delta.
fn extract_delta(event: &SseEvent) -> Result<Delta, ProviderError> {
    let event_type = match event.event_type.as_deref() {
        Some(t) => t,
        None => return Ok(Delta::Skip),
    };

    let parse_err = |e: serde_json::Error| ProviderError::StreamParse(format!("{event_type}: {e}"));

    match event_type {
        "content_block_delta" => {
            #[derive(Deserialize)]
            struct Wrapper {
                delta: BlockDelta,
            }
            #[derive(Deserialize)]
            struct BlockDelta {
                #[serde(rename = "type")]
                delta_type: String,
                text: Option<String>,
            }
            let w: Wrapper = serde_json::from_str(&event.data).map_err(parse_err)?;
            match (w.delta.delta_type.as_str(), w.delta.text) {
                ("text_delta", Some(text)) => Ok(Delta::Text(text)),
                _ => Ok(Delta::Skip),
            }
        }
        "message_stop" => Ok(Delta::End),
        "error" => {
            #[derive(Deserialize)]
            struct Wrapper {
                error: ErrorBody,
            }
            #[derive(Deserialize)]
            struct ErrorBody {
                #[serde(rename = "type")]
                error_type: String,
                message: String,
            }
            let w: Wrapper = serde_json::from_str(&event.data).map_err(parse_err)?;
            match w.error.error_type.as_str() {
                "overloaded_error" => Err(ProviderError::Overloaded),
                _ => Err(ProviderError::Upstream {
                    message: format!("{}: {}", w.error.error_type, w.error.message),
                }),
            }
        }
        "message_start" | "content_block_start" | "content_block_stop" | "message_delta"
        | "ping" => Ok(Delta::Skip),
        _ => {
            tracing::debug!("Unknown SSE event type: {event_type}");
            Ok(Delta::Skip)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::ChatTurn;

    fn event(event_type: &str, data: &str) -> SseEvent {
        SseEvent {
            event_type: Some(event_type.to_string()),
            data: data.to_string(),
        }
    }

    #[test]
    fn text_delta_is_extracted() {
        let delta = extract_delta(&event(
            "content_block_delta",
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#,
        ))
        .unwrap();
        assert_eq!(delta, Delta::Text("Hello".into()));
    }

    #[test]
    fn thinking_delta_is_skipped() {
        let delta = extract_delta(&event(
            "content_block_delta",
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"hmm"}}"#,
        ))
        .unwrap();
        assert_eq!(delta, Delta::Skip);
    }

    #[test]
    fn message_stop_ends_stream() {
        let delta = extract_delta(&event("message_stop", r#"{"type":"message_stop"}"#)).unwrap();
        assert_eq!(delta, Delta::End);
    }

    #[test]
    fn error_event_fails() {
        let err = extract_delta(&event(
            "error",
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, ProviderError::Overloaded));

        let err = extract_delta(&event(
            "error",
            r#"{"type":"error","error":{"type":"api_error","message":"boom"}}"#,
        ))
        .unwrap_err();
        assert_eq!(err.to_string(), "Upstream error: api_error: boom");
    }

    #[test]
    fn events_without_type_are_skipped() {
        let delta = extract_delta(&SseEvent {
            event_type: None,
            data: "{}".into(),
        })
        .unwrap();
        assert_eq!(delta, Delta::Skip);
    }

    #[test]
    fn system_turns_are_lifted_out() {
        let request = ProviderRequest {
            model: "claude-sonnet-4-6".into(),
            turns: vec![
                ChatTurn::system("Be terse."),
                ChatTurn::user("hi"),
                ChatTurn::system("Use British spelling."),
                ChatTurn::assistant("Hello"),
                ChatTurn::user("colour?"),
            ],
            temperature: Some(0.6),
            max_tokens: 2048,
        };
        let body = serde_json::to_value(build_body(&request)).unwrap();
        assert_eq!(body["system"], "Be terse.\n\nUse British spelling.");
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][1]["role"], "assistant");
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn empty_system_is_omitted() {
        let request = ProviderRequest {
            model: "claude-haiku-4-5".into(),
            turns: vec![ChatTurn::user("hi")],
            temperature: None,
            max_tokens: 16,
        };
        let body = serde_json::to_value(build_body(&request)).unwrap();
        assert!(body.get("system").is_none());
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn provider_name() {
        let provider = AnthropicProvider::new(reqwest::Client::new(), "k", "https://api.example.com");
        assert_eq!(provider.name(), "anthropic");
    }
}
