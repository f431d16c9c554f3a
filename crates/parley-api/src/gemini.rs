//! Google Gemini `streamGenerateContent` adapter.

use crate::http::open_stream;
use crate::stream::{Delta, SseDeltaStream};
use parley_types::provider::{DeltaStream, Provider, ProviderRequest};
use parley_types::sse::SseEvent;
use parley_types::{ChatTurn, ProviderError, Role};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

#[derive(Clone)]
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
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

    fn stream_url(&self, model: &str) -> String {
        let model = model.trim_start_matches('/');
        if model.starts_with("models/") {
            format!("{}/{model}:streamGenerateContent?alt=sse", self.base_url)
        } else {
            format!("{}/models/{model}:streamGenerateContent?alt=sse", self.base_url)
        }
    }
}

impl Provider for GeminiProvider {
    fn stream_text<'a>(
        &'a self,
        request: &'a ProviderRequest,
    ) -> Pin<Box<dyn Future<Output = Result<DeltaStream, ProviderError>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.stream_url(&request.model);
            tracing::debug!(model = %request.model, "POST {url}");

            let body = GenerateRequest {
                contents: vec![Content {
                    role: "user",
                    parts: vec![Part {
                        text: build_prompt(&request.turns),
                    }],
                }],
                generation_config: GenerationConfig {
                    temperature: request.temperature,
                    max_output_tokens: request.max_tokens,
                },
            };
            let builder = self
                .http
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body);

            let response = open_stream(self.name(), builder).await?;
            // Gemini has no end marker: the body simply closes.
            let stream = SseDeltaStream::new(response.bytes_stream(), extract_delta, false);
            Ok(Box::pin(stream) as DeltaStream)
        })
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_output_tokens: u32,
}

/// Render the conversation as one transcript-style prompt that ends with an
/// open `Assistant:` line for the model to complete.
fn build_prompt(turns: &[ChatTurn]) -> String {
    let mut lines = Vec::new();
    for turn in turns {
        let text = turn.content.trim();
        if text.is_empty() {
            continue;
        }
        let speaker = match turn.role {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        lines.push(format!("{speaker}: {text}"));
    }
    lines.push("Assistant:".to_string());
    lines.join("\n").trim().to_string()
}

/// Map one `GenerateContentResponse` SSE event to a delta.
fn extract_delta(event: &SseEvent) -> Result<Delta, ProviderError> {
    #[derive(Deserialize)]
    struct Response {
        #[serde(default)]
        candidates: Vec<Candidate>,
        error: Option<ErrorBody>,
    }
    #[derive(Deserialize)]
    struct Candidate {
        content: Option<CandidateContent>,
    }
    #[derive(Deserialize)]
    struct CandidateContent {
        #[serde(default)]
        parts: Vec<CandidatePart>,
    }
    #[derive(Deserialize)]
    struct CandidatePart {
        text: Option<String>,
    }
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
    }

    if event.data.trim().is_empty() {
        return Ok(Delta::Skip);
    }

    let response: Response = serde_json::from_str(&event.data)
        .map_err(|e| ProviderError::StreamParse(format!("generateContent: {e}")))?;

    if let Some(error) = response.error {
        return Err(ProviderError::Upstream {
            message: error
                .message
                .unwrap_or_else(|| "unspecified upstream error".into()),
        });
    }

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        Ok(Delta::Skip)
    } else {
        Ok(Delta::Text(text))
    }
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

    #[test]
    fn prompt_is_rendered_as_transcript() {
        let prompt = build_prompt(&[
            ChatTurn::system("  Be kind. "),
            ChatTurn::user("hi"),
            ChatTurn::assistant(""),
            ChatTurn::assistant("Hello!"),
            ChatTurn::user("how are you?"),
        ]);
        assert_eq!(
            prompt,
            "System: Be kind.\nUser: hi\nAssistant: Hello!\nUser: how are you?\nAssistant:"
        );
    }

    #[test]
    fn empty_conversation_still_prompts() {
        assert_eq!(build_prompt(&[]), "Assistant:");
    }

    #[test]
    fn parts_are_concatenated() {
        let delta = extract_delta(&event(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hel"},{"text":"lo"}]}}]}"#,
        ))
        .unwrap();
        assert_eq!(delta, Delta::Text("Hello".into()));
    }

    #[test]
    fn metadata_only_chunk_is_skipped() {
        let delta = extract_delta(&event(
            r#"{"candidates":[{"finishReason":"STOP"}],"usageMetadata":{"totalTokenCount":9}}"#,
        ))
        .unwrap();
        assert_eq!(delta, Delta::Skip);
    }

    #[test]
    fn error_payload_fails() {
        let err = extract_delta(&event(r#"{"error":{"code":400,"message":"API key not valid"}}"#))
            .unwrap_err();
        assert!(matches!(err, ProviderError::Upstream { .. }));
    }

    #[test]
    fn stream_url_handles_model_prefix() {
        let provider = GeminiProvider::new(
            reqwest::Client::new(),
            "k",
            "https://generativelanguage.googleapis.com/v1beta/",
        );
        assert_eq!(
            provider.stream_url("models/gemini-2.5-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
        assert_eq!(
            provider.stream_url("gemini-2.5-flash-lite"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash-lite:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn request_body_shape() {
        let body = serde_json::to_value(GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: "x".into() }],
            }],
            generation_config: GenerationConfig {
                temperature: Some(0.5),
                max_output_tokens: 2048,
            },
        })
        .unwrap();
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "x");
    }
}
