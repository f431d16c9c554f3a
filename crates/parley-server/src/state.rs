use crate::auth::IdentityVerifier;
use parley_core::Relay;
use parley_session::ConversationStore;
use std::sync::Arc;

/// Shared, read-only handler state.
#[derive(Clone)]
pub struct AppState {
    pub relay: Relay,
    pub store: Arc<ConversationStore>,
    pub identity: Arc<IdentityVerifier>,
}

impl AppState {
    pub fn new(relay: Relay, store: ConversationStore, identity: IdentityVerifier) -> Self {
        Self {
            relay,
            store: Arc::new(store),
            identity: Arc::new(identity),
        }
    }
}
