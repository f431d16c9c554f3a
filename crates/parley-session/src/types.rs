//! Chat record types.

use chrono::{DateTime, Utc};
use parley_types::{ChatTurn, Conversation, Role, ellipsize, truncate_str};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title given to a chat before its first user message.
pub const DEFAULT_TITLE: &str = "New Chat";

/// A persisted conversation owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub turns: Conversation,
}

impl Chat {
    /// Create a new empty chat.
    pub fn new(user_id: impl Into<String>, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            title: DEFAULT_TITLE.to_string(),
            model: model.into(),
            created_at: now,
            updated_at: now,
            turns: Conversation::new(),
        }
    }

    /// Short hex prefix of the chat ID for display.
    pub fn short_id(&self) -> String {
        self.id.to_string()[..8].to_string()
    }

    fn first_user_text(&self) -> Option<&str> {
        self.turns
            .turns()
            .iter()
            .filter(|t| t.role == Role::User)
            .map(|t| t.content.trim())
            .find(|t| !t.is_empty())
    }

    /// Generate a preview string from the first user message.
    pub fn preview(&self) -> String {
        self.first_user_text()
            .map(|t| ellipsize(t, 80))
            .unwrap_or_default()
    }

    /// Derive the title from the first user message.
    /// No-op once the title has moved away from the default.
    pub fn auto_title(&mut self) {
        if self.title != DEFAULT_TITLE {
            return;
        }
        if let Some(text) = self.first_user_text() {
            let first_line = text.lines().next().unwrap_or(text);
            self.title = truncate_str(first_line, 60).trim_end().to_string();
        }
    }

    /// Append a turn, refreshing the title and timestamp.
    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
        self.touch();
    }

    /// Replace every turn, refreshing the title and timestamp.
    pub fn replace_turns(&mut self, turns: Vec<ChatTurn>) {
        self.turns = Conversation::from_turns(turns);
        self.touch();
    }

    fn touch(&mut self) {
        self.auto_title();
        self.updated_at = Utc::now();
    }

    /// Build a summary for listing.
    pub fn to_summary(&self) -> ChatSummary {
        ChatSummary {
            id: self.id,
            title: self.title.clone(),
            model: self.model.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            turn_count: self.turns.len(),
            preview: self.preview(),
        }
    }
}

/// Lightweight summary for chat listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: Uuid,
    pub title: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub turn_count: usize,
    pub preview: String,
}

impl ChatSummary {
    /// Short hex prefix of the chat ID for display.
    pub fn short_id(&self) -> String {
        self.id.to_string()[..8].to_string()
    }

    /// Human-readable age string (e.g. "2h ago", "3d ago").
    pub fn age(&self) -> String {
        let duration = Utc::now() - self.updated_at;
        let minutes = duration.num_minutes();
        if minutes < 1 {
            "just now".to_string()
        } else if minutes < 60 {
            format!("{minutes}m ago")
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn new_chat_has_default_title() {
        let chat = Chat::new("alice", "demo:echo");
        assert_eq!(chat.title, DEFAULT_TITLE);
        assert!(chat.turns.is_empty());
        assert_eq!(chat.short_id().len(), 8);
    }

    #[test]
    fn title_comes_from_first_user_message() {
        let mut chat = Chat::new("alice", "demo:echo");
        chat.push(ChatTurn::system("You are helpful."));
        chat.push(ChatTurn::user("  Fix the auth bug\nand add tests"));
        chat.push(ChatTurn::assistant("OK"));
        chat.push(ChatTurn::user("Another question"));
        assert_eq!(chat.title, "Fix the auth bug");
    }

    #[test]
    fn title_is_truncated() {
        let mut chat = Chat::new("alice", "demo:echo");
        chat.push(ChatTurn::user("é".repeat(100)));
        assert!(chat.title.len() <= 60);
        assert!(chat.title.chars().all(|c| c == 'é'));
    }

    #[test]
    fn title_survives_replace_turns() {
        let mut chat = Chat::new("alice", "demo:echo");
        chat.push(ChatTurn::user("Original"));
        chat.replace_turns(vec![ChatTurn::user("Different")]);
        assert_eq!(chat.title, "Original");
        assert_eq!(chat.turns.len(), 1);
    }

    #[test]
    fn blank_user_turn_keeps_default_title() {
        let mut chat = Chat::new("alice", "demo:echo");
        chat.push(ChatTurn::user("   "));
        assert_eq!(chat.title, DEFAULT_TITLE);
        assert_eq!(chat.preview(), "");
    }

    #[test]
    fn preview_is_ellipsized() {
        let mut chat = Chat::new("alice", "demo:echo");
        chat.push(ChatTurn::user("a".repeat(100)));
        let preview = chat.preview();
        assert!(preview.len() <= 80);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn summary_age() {
        let mut chat = Chat::new("alice", "demo:echo");
        assert_eq!(chat.to_summary().age(), "just now");
        chat.updated_at = Utc::now() - Duration::hours(3);
        assert_eq!(chat.to_summary().age(), "3h ago");
        chat.updated_at = Utc::now() - Duration::days(2);
        assert_eq!(chat.to_summary().age(), "2d ago");
    }

    #[test]
    fn chat_json_round_trip_keeps_turns() {
        let mut chat = Chat::new("alice", "demo:echo");
        chat.push(ChatTurn::user("hi"));
        let json = serde_json::to_string(&chat).unwrap();
        let back: Chat = serde_json::from_str(&json).unwrap();
        assert_eq!(back.turns, chat.turns);
        assert_eq!(back.title, "hi");
    }
}
