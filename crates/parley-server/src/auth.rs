//! Bearer-token identity.

use crate::error::RelayError;
use crate::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::HeaderValue;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use std::collections::HashMap;

/// Maps bearer credentials to user ids.
#[derive(Debug, Clone, Default)]
pub struct IdentityVerifier {
    tokens: HashMap<String, String>,
}

impl IdentityVerifier {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    /// The user owning `credential`, if any.
    pub fn verify(&self, credential: &str) -> Option<String> {
        if credential.is_empty() {
            return None;
        }
        self.tokens.get(credential).cloned()
    }
}

/// The authenticated caller of a `/v1` route.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = RelayError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_bearer(parts.headers.get(AUTHORIZATION)).ok_or(RelayError::Unauthorized)?;
        match state.identity.verify(&token) {
            Some(user) => Ok(AuthUser(user)),
            None => {
                tracing::debug!(path = %parts.uri.path(), "rejected bearer credential");
                Err(RelayError::Unauthorized)
            }
        }
    }
}

fn extract_bearer(header: Option<&HeaderValue>) -> Option<String> {
    let value = header?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(|token| token.trim().to_string())
}
