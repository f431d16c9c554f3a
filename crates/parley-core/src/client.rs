//! HTTP client for the relay server.

use crate::protocol::{
    CHAT_ID_HEADER, ChatStreamRequest, CreateChatRequest, ErrorBody, ModelsResponse,
};
use bytes::Bytes;
use futures_core::Stream;
use parley_session::{Chat, ChatSummary};
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors talking to the relay server (as opposed to errors the relay
/// reports inside a stream).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server rejected the bearer credential.
    #[error("Unauthorized: sign in again")]
    Unauthorized,

    #[error("Nothing to retry: the conversation has no user message")]
    NothingToRetry,

    #[error("Server returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn short_message(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Your session has expired. Sign in again.",
            Self::NothingToRetry => "There is no message to retry.",
            Self::Http { status: 404, .. } => "That chat no longer exists.",
            Self::Http { .. } => "The server rejected the request.",
            Self::Network(_) => "Could not reach the server.",
            Self::Decode(_) => "The server sent an unexpected response.",
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// An accepted `/v1/chat/stream` response, body not yet read.
pub struct OpenedStream {
    /// The chat the server appended to (created on demand).
    pub chat_id: Option<Uuid>,
    pub body: ByteStream,
}

/// Talks to one relay server with one bearer credential.
#[derive(Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// `POST /v1/chat/stream`. The body is returned unread.
    pub async fn open_stream(&self, body: &ChatStreamRequest) -> Result<OpenedStream, ClientError> {
        tracing::debug!(model = %body.model, chat_id = ?body.chat_id, retry = body.retry, "opening relay stream");
        let response = self
            .request(reqwest::Method::POST, "/v1/chat/stream")
            .json(body)
            .send()
            .await?;
        let response = check(response).await?;

        let chat_id = response
            .headers()
            .get(CHAT_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok());
        Ok(OpenedStream {
            chat_id,
            body: Box::pin(response.bytes_stream()),
        })
    }

    pub async fn models(&self) -> Result<Vec<String>, ClientError> {
        let response = self.request(reqwest::Method::GET, "/v1/models").send().await?;
        let body: ModelsResponse = check(response).await?.json().await?;
        Ok(body.models)
    }

    pub async fn list_chats(&self) -> Result<Vec<ChatSummary>, ClientError> {
        let response = self.request(reqwest::Method::GET, "/v1/chats").send().await?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn create_chat(&self, model: &str) -> Result<ChatSummary, ClientError> {
        let response = self
            .request(reqwest::Method::POST, "/v1/chats")
            .json(&CreateChatRequest {
                model: model.to_string(),
            })
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn load_chat(&self, id: Uuid) -> Result<Chat, ClientError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/v1/chats/{id}"))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn delete_chat(&self, id: Uuid) -> Result<(), ClientError> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/v1/chats/{id}"))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

/// Map non-2xx responses to errors; 401 is always [`ClientError::Unauthorized`].
async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|b| b.error)
        .unwrap_or(text);
    Err(ClientError::Http {
        status: status.as_u16(),
        message,
    })
}
