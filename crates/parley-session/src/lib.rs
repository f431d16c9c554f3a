//! Per-user conversation persistence for Parley.

pub mod error;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use store::ConversationStore;
pub use types::{Chat, ChatSummary, DEFAULT_TITLE};
