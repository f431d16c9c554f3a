//! Client-side chat session: the conversation, its id and the send/retry
//! operations.

use crate::client::{ClientError, RelayClient};
use crate::consumer::{CancelHandle, ERROR_PREFIX, StreamConsumer, StreamState};
use crate::protocol::ChatStreamRequest;
use parley_types::{Attachment, ChatTurn, Conversation, Role, StreamEvent};
use uuid::Uuid;

/// One conversation driven through a [`RelayClient`].
pub struct ChatSession {
    client: RelayClient,
    conversation: Conversation,
    chat_id: Option<Uuid>,
    model: String,
    temperature: Option<f32>,
    state: StreamState,
    /// The trailing user turn was rejected with 401 and never reached the relay.
    unsent: bool,
}

impl ChatSession {
    pub fn new(client: RelayClient, model: impl Into<String>) -> Self {
        Self {
            client,
            conversation: Conversation::new(),
            chat_id: None,
            model: model.into(),
            temperature: None,
            state: StreamState::Idle,
            unsent: false,
        }
    }

    pub fn client(&self) -> &RelayClient {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut RelayClient {
        &mut self.client
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn chat_id(&self) -> Option<Uuid> {
        self.chat_id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    pub fn set_temperature(&mut self, temperature: Option<f32>) {
        self.temperature = temperature;
    }

    /// State of the most recent stream.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Forget the current conversation; the next send starts a new chat.
    pub fn reset(&mut self) {
        self.conversation = Conversation::new();
        self.chat_id = None;
        self.state = StreamState::Idle;
        self.unsent = false;
    }

    /// Replace the local conversation with a stored chat.
    pub async fn open(&mut self, id: Uuid) -> Result<(), ClientError> {
        let chat = self.client.load_chat(id).await?;
        self.conversation = chat.turns;
        self.chat_id = Some(chat.id);
        self.model = chat.model;
        self.state = StreamState::Idle;
        self.unsent = false;
        Ok(())
    }

    /// Send a user message and stream the reply into the conversation.
    ///
    /// A previous error turn is dropped first, and so is a user turn that
    /// was rejected with 401 and not retried.
    pub async fn send<F>(
        &mut self,
        text: &str,
        attachments: Vec<Attachment>,
        cancel: CancelHandle,
        on_event: F,
    ) -> Result<StreamState, ClientError>
    where
        F: FnMut(&StreamEvent),
    {
        self.discard_unsent_turns();
        self.conversation.push(ChatTurn::user(text));
        self.stream_reply(false, attachments, cancel, on_event).await
    }

    /// Re-issue the last user turn, discarding whatever followed it.
    pub async fn retry<F>(&mut self, cancel: CancelHandle, on_event: F) -> Result<StreamState, ClientError>
    where
        F: FnMut(&StreamEvent),
    {
        if self.state == StreamState::Streaming || !self.conversation.has_user_turn() {
            return Err(ClientError::NothingToRetry);
        }
        self.conversation.truncate_to_last_user();
        self.unsent = false;
        self.stream_reply(true, Vec::new(), cancel, on_event).await
    }

    /// The request is built from the conversation as it ends with the user
    /// turn; the empty assistant turn is appended afterwards.
    async fn stream_reply<F>(
        &mut self,
        retry: bool,
        attachments: Vec<Attachment>,
        cancel: CancelHandle,
        on_event: F,
    ) -> Result<StreamState, ClientError>
    where
        F: FnMut(&StreamEvent),
    {
        let request = ChatStreamRequest {
            chat_id: self.chat_id,
            model: self.model.clone(),
            temperature: self.temperature,
            messages: self.conversation.turns().to_vec(),
            retry,
            attachments,
        };
        self.conversation.begin_assistant_turn();
        self.state = StreamState::Streaming;

        let opened = match self.client.open_stream(&request).await {
            Ok(opened) => opened,
            Err(ClientError::Unauthorized) => {
                // Leave the user turn in place so it can be retried after login
                self.conversation.truncate_to_last_user();
                self.state = StreamState::Idle;
                self.unsent = true;
                return Err(ClientError::Unauthorized);
            }
            Err(e) => {
                tracing::warn!("failed to open relay stream: {e}");
                self.conversation
                    .set_assistant_content(format!("{ERROR_PREFIX}{}", e.short_message()));
                self.state = StreamState::Failed;
                return Ok(self.state);
            }
        };
        if opened.chat_id.is_some() {
            self.chat_id = opened.chat_id;
        }

        let mut consumer = StreamConsumer::with_cancel(cancel);
        self.state = consumer
            .consume(opened.body, &mut self.conversation, on_event)
            .await;
        Ok(self.state)
    }

    /// Remove turns the relay never stored: an `Error: ` turn standing in
    /// for a failed reply, and a user turn rejected with 401.
    fn discard_unsent_turns(&mut self) {
        let error_turn = self.state == StreamState::Failed
            && self
                .conversation
                .last()
                .is_some_and(|t| t.role == Role::Assistant && t.content.starts_with(ERROR_PREFIX));
        if error_turn {
            self.conversation.pop();
        }
        if std::mem::take(&mut self.unsent)
            && self.conversation.last().is_some_and(|t| t.role == Role::User)
        {
            self.conversation.pop();
        }
    }
}
