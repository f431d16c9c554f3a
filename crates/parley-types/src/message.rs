//! Conversation types shared by the relay, the store and the client.

use serde::{Deserialize, Serialize};

/// Role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A text file attached to a chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub content: String,
}

/// An ordered sequence of turns.
///
/// Append-only, except for [`Conversation::truncate_to_last_user`] which
/// implements retry-from-last-turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<ChatTurn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<ChatTurn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn into_turns(self) -> Vec<ChatTurn> {
        self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    pub fn last(&self) -> Option<&ChatTurn> {
        self.turns.last()
    }

    /// Remove and return the trailing turn.
    pub fn pop(&mut self) -> Option<ChatTurn> {
        self.turns.pop()
    }

    /// Index of the most recent user turn.
    pub fn last_user_index(&self) -> Option<usize> {
        self.turns.iter().rposition(|t| t.role == Role::User)
    }

    pub fn has_user_turn(&self) -> bool {
        self.last_user_index().is_some()
    }

    /// Drop everything after the most recent user turn.
    ///
    /// Returns `false` (and leaves the conversation untouched) when there is
    /// no user turn.
    pub fn truncate_to_last_user(&mut self) -> bool {
        match self.last_user_index() {
            Some(idx) => {
                self.turns.truncate(idx + 1);
                true
            }
            None => false,
        }
    }

    /// Append an empty assistant turn for a reply that is about to stream in.
    pub fn begin_assistant_turn(&mut self) {
        self.turns.push(ChatTurn::assistant(String::new()));
    }

    /// Append text to the trailing assistant turn.
    ///
    /// Returns `false` if the conversation does not end with an assistant turn.
    pub fn append_to_assistant(&mut self, text: &str) -> bool {
        match self.turns.last_mut() {
            Some(turn) if turn.role == Role::Assistant => {
                turn.content.push_str(text);
                true
            }
            _ => false,
        }
    }

    /// Overwrite the trailing assistant turn's content.
    pub fn set_assistant_content(&mut self, content: String) -> bool {
        match self.turns.last_mut() {
            Some(turn) if turn.role == Role::Assistant => {
                turn.content = content;
                true
            }
            _ => false,
        }
    }
}

impl From<Vec<ChatTurn>> for Conversation {
    fn from(turns: Vec<ChatTurn>) -> Self {
        Self::from_turns(turns)
    }
}
