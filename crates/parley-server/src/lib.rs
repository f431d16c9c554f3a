//! HTTP surface of the Parley relay: authentication, chat persistence and
//! the streaming endpoint.

pub mod auth;
pub mod error;
pub mod http;
pub mod state;

pub use auth::{AuthUser, IdentityVerifier};
pub use error::RelayError;
pub use http::{cors_layer, router};
pub use state::AppState;
