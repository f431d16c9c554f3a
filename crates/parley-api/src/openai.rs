//! OpenAI-compatible chat completions adapter.
//!
//! Serves every vendor that speaks the `/chat/completions` streaming dialect
//! (OpenAI itself, OpenRouter, Groq, Nebius).

use crate::http::open_stream;
use crate::stream::{Delta, SseDeltaStream};
use parley_types::provider::{DeltaStream, Provider, ProviderRequest};
use parley_types::sse::SseEvent;
use parley_types::{ChatTurn, ProviderError, Role};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Which request field carries the output token limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenLimitParam {
    /// `max_completion_tokens` (OpenAI's current models).
    MaxCompletionTokens,
    /// `max_tokens` (the older field most compatible vendors still use).
    MaxTokens,
}

#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    name: String,
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    extra_headers: Vec<(String, String)>,
    token_param: TokenLimitParam,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        name: impl Into<String>,
        http: reqwest::Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            extra_headers: Vec::new(),
            token_param: TokenLimitParam::MaxTokens,
        }
    }

    /// Headers sent with every request (e.g. OpenRouter attribution).
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.extra_headers = headers;
        self
    }

    pub fn with_token_param(mut self, param: TokenLimitParam) -> Self {
        self.token_param = param;
        self
    }

    fn build_body<'a>(&self, request: &'a ProviderRequest) -> ChatCompletionRequest<'a> {
        let (max_tokens, max_completion_tokens) = match self.token_param {
            TokenLimitParam::MaxTokens => (Some(request.max_tokens), None),
            TokenLimitParam::MaxCompletionTokens => (None, Some(request.max_tokens)),
        };
        ChatCompletionRequest {
            model: &request.model,
            messages: request.turns.iter().map(WireMessage::from).collect(),
            stream: true,
            temperature: request.temperature,
            max_tokens,
            max_completion_tokens,
        }
    }
}

impl Provider for OpenAiCompatibleProvider {
    fn stream_text<'a>(
        &'a self,
        request: &'a ProviderRequest,
    ) -> Pin<Box<dyn Future<Output = Result<DeltaStream, ProviderError>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}/chat/completions", self.base_url);
            tracing::debug!(provider = %self.name, model = %request.model, "POST {url}");

            let mut builder = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&self.build_body(request));
            for (name, value) in &self.extra_headers {
                builder = builder.header(name.as_str(), value.as_str());
            }

            let response = open_stream(&self.name, builder).await?;
            let stream = SseDeltaStream::new(response.bytes_stream(), extract_delta, true);
            Ok(Box::pin(stream) as DeltaStream)
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

impl<'a> From<&'a ChatTurn> for WireMessage<'a> {
    fn from(turn: &'a ChatTurn) -> Self {
        Self {
            role: turn.role,
            content: &turn.content,
        }
    }
}

/// Map one `chat.completion.chunk` SSE event to a delta.
fn extract_delta(event: &SseEvent) -> Result<Delta, ProviderError> {
    #[derive(Deserialize)]
    struct Chunk {
        #[serde(default)]
        choices: Vec<Choice>,
        error: Option<ErrorBody>,
    }
    #[derive(Deserialize)]
    struct Choice {
        delta: Option<ChoiceDelta>,
    }
    #[derive(Deserialize)]
    struct ChoiceDelta {
        content: Option<String>,
    }
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
    }

    let data = event.data.trim();
    if data.is_empty() {
        return Ok(Delta::Skip);
    }
    if data == "[DONE]" {
        return Ok(Delta::End);
    }

    let chunk: Chunk = serde_json::from_str(data)
        .map_err(|e| ProviderError::StreamParse(format!("chat.completion.chunk: {e}")))?;

    if let Some(error) = chunk.error {
        return Err(ProviderError::Upstream {
            message: error
                .message
                .unwrap_or_else(|| "unspecified upstream error".into()),
        });
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .map(Delta::Text)
        .unwrap_or(Delta::Skip))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(data: &str) -> SseEvent {
        SseEvent {
            event_type: None,
            data: data.to_string(),
        }
    }

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: "gpt-5-mini".into(),
            turns: vec![ChatTurn::system("be brief"), ChatTurn::user("hi")],
            temperature: None,
            max_tokens: 2048,
        }
    }

    #[test]
    fn extracts_content_delta() {
        let delta = extract_delta(&event(
            r#"{"id":"c1","object":"chat.completion.chunk","choices":[{"index":0,"delta":{"content":"Hel"}}]}"#,
        ))
        .unwrap();
        assert_eq!(delta, Delta::Text("Hel".into()));
    }

    #[test]
    fn role_only_and_empty_choices_are_skipped() {
        assert_eq!(
            extract_delta(&event(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#)).unwrap(),
            Delta::Skip
        );
        assert_eq!(
            extract_delta(&event(r#"{"choices":[],"usage":{"total_tokens":3}}"#)).unwrap(),
            Delta::Skip
        );
    }

    #[test]
    fn done_marker_ends_stream() {
        assert_eq!(extract_delta(&event("[DONE]")).unwrap(), Delta::End);
    }

    #[test]
    fn inline_error_object_fails() {
        let err = extract_delta(&event(r#"{"error":{"message":"context length exceeded"}}"#))
            .unwrap_err();
        assert!(matches!(err, ProviderError::Upstream { message } if message == "context length exceeded"));
    }

    #[test]
    fn malformed_chunk_is_a_parse_error() {
        assert!(matches!(
            extract_delta(&event("{not json")),
            Err(ProviderError::StreamParse(_))
        ));
    }

    #[test]
    fn body_uses_configured_token_param_and_omits_missing_temperature() {
        let provider = OpenAiCompatibleProvider::new(
            "openai",
            reqwest::Client::new(),
            "sk-test",
            "https://api.example.com/v1/",
        )
        .with_token_param(TokenLimitParam::MaxCompletionTokens);
        let req = request();
        let body = serde_json::to_value(provider.build_body(&req)).unwrap();

        assert_eq!(body["max_completion_tokens"], 2048);
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("temperature").is_none());
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(provider.base_url, "https://api.example.com/v1");
    }

    #[test]
    fn body_defaults_to_max_tokens() {
        let provider =
            OpenAiCompatibleProvider::new("groq", reqwest::Client::new(), "k", "https://x");
        let mut req = request();
        req.temperature = Some(0.6);
        let body = serde_json::to_value(provider.build_body(&req)).unwrap();
        assert_eq!(body["max_tokens"], 2048);
        assert!((body["temperature"].as_f64().unwrap() - 0.6).abs() < 1e-6);
    }
}
