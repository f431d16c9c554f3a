//! Shared HTTP plumbing for upstream providers.

use std::time::Duration;

use parley_types::ProviderError;
use reqwest::header::HeaderMap;

/// Upper bound on establishing a TCP/TLS connection to a provider.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the HTTP client shared by every adapter.
pub fn http_client() -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| ProviderError::Network(e.to_string()))
}

/// Send a streaming request and return the response once the provider has
/// accepted it. Non-2xx responses are read and classified.
///
/// There is no retry loop here: a failed turn is retried by the client.
pub(crate) async fn open_stream(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, ProviderError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Network(e.to_string())
        }
    })?;

    let status = response.status();
    if status.is_success() {
        tracing::debug!(provider, %status, "upstream stream opened");
        return Ok(response);
    }

    let retry_after = parse_retry_after(response.headers());
    let body_text = response.text().await.unwrap_or_default();
    let err = classify_error(status.as_u16(), &body_text, retry_after);
    tracing::warn!(provider, %status, "upstream rejected request: {err}");
    Err(err)
}

/// Parse the `retry-after` header value as seconds and convert to milliseconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<f64>().ok())
        .map(|secs| (secs * 1000.0) as u64)
}

/// Classify an HTTP error response into a typed ProviderError.
pub(crate) fn classify_error(status: u16, body: &str, retry_after: Option<u64>) -> ProviderError {
    // OpenAI, Anthropic and Gemini all nest the detail under `error.message`.
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: Option<ErrorDetail>,
    }
    #[derive(serde::Deserialize)]
    struct ErrorDetail {
        message: Option<String>,
    }

    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.to_string());

    match status {
        401 | 403 => ProviderError::Auth { message },
        400 | 404 | 422 => ProviderError::BadRequest { message },
        429 => ProviderError::RateLimited {
            retry_after_ms: retry_after,
        },
        529 => ProviderError::Overloaded,
        _ => ProviderError::Server { status, message },
    }
}
