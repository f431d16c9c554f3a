//! Store-specific error types.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during conversation store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Chat not found: {id}")]
    NotFound { id: Uuid },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
