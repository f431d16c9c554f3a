use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use parley_session::StoreError;
use parley_types::ConfigError;
use thiserror::Error;
use uuid::Uuid;

/// Top-level error for HTTP handlers. Rendered as `{"error": "..."}`.
///
/// Upstream and routing failures on the streaming endpoint never reach this
/// type; they travel inside the stream as error frames.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Chat not found: {0}")]
    ChatNotFound(Uuid),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for RelayError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { id } => Self::ChatNotFound(id),
            other => Self::Store(other),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let code = match &self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ChatNotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::Config(_) => StatusCode::BAD_REQUEST,
            Self::Store(e) => {
                tracing::error!("chat store failure: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (code, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_maps_to_404() {
        let id = Uuid::new_v4();
        let err = RelayError::from(StoreError::NotFound { id });
        assert!(matches!(err, RelayError::ChatNotFound(found) if found == id));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn config_errors_are_bad_requests() {
        let err = RelayError::from(ConfigError::InvalidModelRef {
            value: "gpt".into(),
        });
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
