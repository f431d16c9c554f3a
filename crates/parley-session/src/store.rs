//! Persistent chat storage backed by JSON files.

use crate::error::StoreError;
use crate::types::{Chat, ChatSummary};
use parley_types::ChatTurn;
use std::path::PathBuf;
use tokio::sync::Mutex;
use uuid::Uuid;

/// File-based conversation store. Each chat is a JSON file in `chats_dir`.
///
/// Mutations are read-modify-write, so they are serialized through one
/// lock; reads go straight to disk.
pub struct ConversationStore {
    chats_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl ConversationStore {
    /// Create a new store, ensuring the chats directory exists.
    pub async fn new(chats_dir: PathBuf) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(&chats_dir).await?;
        Ok(Self {
            chats_dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Create an empty chat for `user_id`.
    pub async fn create(&self, user_id: &str, model: &str) -> Result<Chat, StoreError> {
        let chat = Chat::new(user_id, model);
        let _guard = self.write_lock.lock().await;
        self.save(&chat).await?;
        tracing::debug!(chat_id = %chat.id, user_id, "created chat");
        Ok(chat)
    }

    /// Append one turn to an existing chat.
    pub async fn append(&self, id: Uuid, turn: ChatTurn) -> Result<Chat, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut chat = self.load(id).await?;
        chat.push(turn);
        self.save(&chat).await?;
        Ok(chat)
    }

    /// Replace all turns of an existing chat.
    pub async fn replace_turns(&self, id: Uuid, turns: Vec<ChatTurn>) -> Result<Chat, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut chat = self.load(id).await?;
        chat.replace_turns(turns);
        self.save(&chat).await?;
        Ok(chat)
    }

    /// Record the model most recently used for a chat.
    pub async fn set_model(&self, id: Uuid, model: &str) -> Result<Chat, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut chat = self.load(id).await?;
        if chat.model != model {
            chat.model = model.to_string();
            self.save(&chat).await?;
        }
        Ok(chat)
    }

    /// Load a chat by exact UUID.
    pub async fn load(&self, id: Uuid) -> Result<Chat, StoreError> {
        let path = self.chat_path(id);
        if !path.exists() {
            return Err(StoreError::NotFound { id });
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let chat: Chat = serde_json::from_str(&data)?;
        Ok(chat)
    }

    /// Load a chat only if `user_id` owns it. Someone else's chat reads as
    /// not found.
    pub async fn load_owned(&self, id: Uuid, user_id: &str) -> Result<Chat, StoreError> {
        let chat = self.load(id).await?;
        if chat.user_id != user_id {
            return Err(StoreError::NotFound { id });
        }
        Ok(chat)
    }

    /// List a user's chats, sorted by updated_at descending (most recent first).
    pub async fn list(&self, user_id: &str) -> Result<Vec<ChatSummary>, StoreError> {
        let mut summaries = Vec::new();

        let mut entries = tokio::fs::read_dir(&self.chats_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if !name_str.ends_with(".json") {
                continue;
            }
            match tokio::fs::read_to_string(entry.path()).await {
                Ok(data) => match serde_json::from_str::<Chat>(&data) {
                    Ok(chat) if chat.user_id == user_id => summaries.push(chat.to_summary()),
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Failed to parse chat {}: {}", name_str, e),
                },
                Err(e) => tracing::warn!("Failed to read chat {}: {}", name_str, e),
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    /// Delete a chat file.
    pub async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.chat_path(id);
        if !path.exists() {
            return Err(StoreError::NotFound { id });
        }
        tokio::fs::remove_file(&path).await?;
        Ok(())
    }

    /// Atomic write: .tmp then rename.
    async fn save(&self, chat: &Chat) -> Result<(), StoreError> {
        let path = self.chat_path(chat.id);
        let tmp_path = path.with_extension("tmp");
        let json = serde_json::to_string_pretty(chat)?;
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    fn chat_path(&self, id: Uuid) -> PathBuf {
        self.chats_dir.join(format!("{id}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_TITLE;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn test_store() -> (ConversationStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = ConversationStore::new(tmp.path().join("chats")).await.unwrap();
        (store, tmp)
    }

    #[tokio::test]
    async fn create_and_load_roundtrip() {
        let (store, _tmp) = test_store().await;
        let chat = store.create("alice", "demo:echo").await.unwrap();

        let loaded = store.load(chat.id).await.unwrap();
        assert_eq!(loaded.id, chat.id);
        assert_eq!(loaded.user_id, "alice");
        assert_eq!(loaded.model, "demo:echo");
        assert_eq!(loaded.title, DEFAULT_TITLE);
        assert!(loaded.turns.is_empty());
    }

    #[tokio::test]
    async fn append_keeps_order_and_sets_title() {
        let (store, _tmp) = test_store().await;
        let chat = store.create("alice", "demo:echo").await.unwrap();

        store.append(chat.id, ChatTurn::user("Hello")).await.unwrap();
        store.append(chat.id, ChatTurn::assistant("Hi!")).await.unwrap();

        let loaded = store.load(chat.id).await.unwrap();
        let turns = loaded.turns.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], ChatTurn::user("Hello"));
        assert_eq!(turns[1], ChatTurn::assistant("Hi!"));
        assert_eq!(loaded.title, "Hello");
        assert!(loaded.updated_at >= loaded.created_at);
    }

    #[tokio::test]
    async fn replace_turns_overwrites_history() {
        let (store, _tmp) = test_store().await;
        let chat = store.create("alice", "demo:echo").await.unwrap();
        store.append(chat.id, ChatTurn::user("q")).await.unwrap();
        store.append(chat.id, ChatTurn::assistant("bad answer")).await.unwrap();

        store
            .replace_turns(chat.id, vec![ChatTurn::user("q")])
            .await
            .unwrap();
        let loaded = store.load(chat.id).await.unwrap();
        assert_eq!(loaded.turns.turns(), &[ChatTurn::user("q")]);
    }

    #[tokio::test]
    async fn concurrent_appends_are_not_lost() {
        let (store, _tmp) = test_store().await;
        let store = Arc::new(store);
        let id = store.create("alice", "demo:echo").await.unwrap().id;

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .append(id, ChatTurn::user(format!("m{i}")))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.load(id).await.unwrap().turns.len(), 10);
    }

    #[tokio::test]
    async fn set_model_updates_record() {
        let (store, _tmp) = test_store().await;
        let chat = store.create("alice", "demo:echo").await.unwrap();
        store.set_model(chat.id, "openai:gpt-5").await.unwrap();
        assert_eq!(store.load(chat.id).await.unwrap().model, "openai:gpt-5");
    }

    #[tokio::test]
    async fn load_nonexistent_returns_not_found() {
        let (store, _tmp) = test_store().await;
        let result = store.load(Uuid::new_v4()).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
        let result = store.append(Uuid::new_v4(), ChatTurn::user("x")).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn load_owned_hides_other_users_chats() {
        let (store, _tmp) = test_store().await;
        let chat = store.create("alice", "demo:echo").await.unwrap();
        assert!(store.load_owned(chat.id, "alice").await.is_ok());
        assert!(matches!(
            store.load_owned(chat.id, "bob").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn list_is_per_user_and_most_recent_first() {
        let (store, _tmp) = test_store().await;
        let older = store.create("alice", "demo:echo").await.unwrap();
        let newer = store.create("alice", "demo:echo").await.unwrap();
        store.create("bob", "demo:echo").await.unwrap();
        store.append(older.id, ChatTurn::user("bump")).await.unwrap();

        let summaries = store.list("alice").await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, older.id);
        assert_eq!(summaries[1].id, newer.id);
        assert_eq!(summaries[0].turn_count, 1);

        assert_eq!(store.list("bob").await.unwrap().len(), 1);
        assert!(store.list("carol").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_skips_unreadable_files() {
        let (store, tmp) = test_store().await;
        store.create("alice", "demo:echo").await.unwrap();
        std::fs::write(tmp.path().join("chats").join("garbage.json"), "{oops").unwrap();

        assert_eq!(store.list("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_chat() {
        let (store, _tmp) = test_store().await;
        let chat = store.create("alice", "demo:echo").await.unwrap();
        store.delete(chat.id).await.unwrap();
        assert!(matches!(
            store.load(chat.id).await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.delete(chat.id).await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
