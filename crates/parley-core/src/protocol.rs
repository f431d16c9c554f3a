//! JSON bodies exchanged between the relay server and its clients.

use parley_types::{Attachment, ChatTurn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Response header carrying the (possibly freshly created) chat id.
pub const CHAT_ID_HEADER: &str = "x-chat-id";

/// Body of `POST /v1/chat/stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStreamRequest {
    /// Absent on the first turn of a new chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<Uuid>,
    /// A `provider:model` reference.
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// The conversation up to and including the newest user turn.
    #[serde(default)]
    pub messages: Vec<ChatTurn>,
    /// The messages replace the stored conversation instead of extending it.
    #[serde(default)]
    pub retry: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// Body of `POST /v1/chats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChatRequest {
    pub model: String,
}

/// Body of `GET /v1/models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<String>,
}

/// Body of every non-2xx JSON response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
