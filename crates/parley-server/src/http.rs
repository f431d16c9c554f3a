//! Routes and handlers.

use crate::auth::AuthUser;
use crate::error::RelayError;
use crate::state::AppState;
use async_stream::stream;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use parley_api::TemperaturePolicy;
use parley_core::protocol::{CHAT_ID_HEADER, ChatStreamRequest, CreateChatRequest, ModelsResponse};
use parley_core::{RelayRequest, fold_attachments};
use parley_session::{Chat, ChatSummary, ConversationStore};
use parley_types::{ChatTurn, ProviderModelRef, Role, StreamEvent, frame};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

pub const HEALTH_PATH: &str = "/health";
pub const MODELS_PATH: &str = "/v1/models";
pub const CHAT_STREAM_PATH: &str = "/v1/chat/stream";
pub const CHATS_PATH: &str = "/v1/chats";
pub const CHAT_PATH: &str = "/v1/chats/{id}";

/// Every route, with state applied. CORS is layered on by the caller.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(MODELS_PATH, get(list_models))
        .route(CHAT_STREAM_PATH, post(chat_stream))
        .route(CHATS_PATH, get(list_chats).post(create_chat))
        .route(CHAT_PATH, get(get_chat).delete(delete_chat))
        .with_state(state)
}

/// Allow the configured browser origins; unparseable entries are skipped and
/// `*` allows any origin.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([HeaderName::from_static(CHAT_ID_HEADER)]);
    if origins.iter().any(|o| o.trim() == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{o}'");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

async fn list_models(State(st): State<AppState>, _user: AuthUser) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: st.relay.registry().models(),
    })
}

async fn list_chats(
    State(st): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<ChatSummary>>, RelayError> {
    Ok(Json(st.store.list(&user).await?))
}

async fn create_chat(
    State(st): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<ChatSummary>), RelayError> {
    let model = ProviderModelRef::parse(&req.model)?.to_string();
    let chat = st.store.create(&user, &model).await?;
    Ok((StatusCode::CREATED, Json(chat.to_summary())))
}

async fn get_chat(
    State(st): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Chat>, RelayError> {
    Ok(Json(st.store.load_owned(id, &user).await?))
}

async fn delete_chat(
    State(st): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, RelayError> {
    st.store.load_owned(id, &user).await?;
    st.store.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/chat/stream`.
///
/// Request-shape and ownership problems are answered with a JSON error
/// before streaming starts. Once the body is streaming, every failure is an
/// error frame.
async fn chat_stream(
    State(st): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<ChatStreamRequest>,
) -> Result<Response, RelayError> {
    if let Some(t) = req.temperature {
        if !TemperaturePolicy::RANGE.contains(&t) {
            return Err(RelayError::BadRequest(format!(
                "temperature {t} is outside 0.0..=2.0"
            )));
        }
    }

    // Attachments are folded before persisting so a reload shows them.
    let turns = fold_attachments(req.messages, &req.attachments);
    if turns.last().map(|t| t.role) != Some(Role::User) {
        return Err(RelayError::BadRequest(
            "messages must end with a user turn".into(),
        ));
    }

    let chat = record_user_turn(&st.store, &user, req.chat_id, &req.model, req.retry, &turns).await?;
    tracing::debug!(chat_id = %chat.id, user = %user, model = %req.model, retry = req.retry, "relaying turn");

    let events = st.relay.events(RelayRequest {
        model: req.model,
        temperature: req.temperature,
        turns,
        attachments: Vec::new(),
    });
    let body = persist_reply(events, Arc::clone(&st.store), chat.id);

    let mut response = sse_response(body);
    if let Ok(value) = HeaderValue::from_str(&chat.id.to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(CHAT_ID_HEADER), value);
    }
    Ok(response)
}

/// Bring the stored chat up to date with the request, creating it if needed.
///
/// A new chat or a retry stores the request turns verbatim; otherwise only
/// the trailing user turn is appended.
async fn record_user_turn(
    store: &ConversationStore,
    user: &str,
    chat_id: Option<Uuid>,
    model: &str,
    retry: bool,
    turns: &[ChatTurn],
) -> Result<Chat, RelayError> {
    let chat = match chat_id {
        Some(id) => store.load_owned(id, user).await?,
        None => store.create(user, model).await?,
    };
    if chat.model != model {
        store.set_model(chat.id, model).await?;
    }

    if chat_id.is_none() || retry {
        return Ok(store.replace_turns(chat.id, turns.to_vec()).await?);
    }
    match turns.last() {
        Some(turn) => Ok(store.append(chat.id, turn.clone()).await?),
        None => Ok(chat),
    }
}

/// Encode events as frames, appending the assistant reply to the chat once
/// the stream completes. Errors and disconnects store nothing.
fn persist_reply<S>(
    events: S,
    store: Arc<ConversationStore>,
    chat_id: Uuid,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static
where
    S: Stream<Item = StreamEvent> + Send + 'static,
{
    stream! {
        let mut reply = String::new();
        let mut events = std::pin::pin!(events);
        while let Some(event) = events.next().await {
            match &event {
                StreamEvent::Token { text } => reply.push_str(text),
                StreamEvent::Done => {
                    let turn = ChatTurn::assistant(std::mem::take(&mut reply));
                    if let Err(e) = store.append(chat_id, turn).await {
                        tracing::warn!(%chat_id, "failed to store assistant reply: {e}");
                    }
                }
                StreamEvent::Error { .. } => {}
            }
            yield Ok::<Bytes, Infallible>(Bytes::from(frame::encode(&event)));
        }
    }
}

pub fn sse_response<S>(stream: S) -> Response
where
    S: Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
{
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    (headers, Body::from_stream(stream)).into_response()
}
