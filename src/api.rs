use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;

use crate::chat::{Chat, ChatView, FieldErrors, Message, MessageCreatedView, NewChat, NewMessage};
use crate::journal::{truncate, Journal, Sinks};
use crate::store::Store;

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

/// How many characters of a title or message text make it into the journal.
const JOURNAL_PREVIEW_CHARS: usize = 50;

pub struct AppState {
    pub store: Store,
    pub journal: Journal,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chats/", post(create_chat))
        .route("/chats/:id/", get(get_chat).delete(delete_chat))
        .route("/chats/:id/messages/", post(create_message))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

// -----------------------------------------------------------------------------
// Errors
// -----------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    /// Field validation failure; 400 with the field-error map as body.
    Validation(FieldErrors),
    /// Referenced chat does not exist; 404, empty body.
    NotFound,
    /// Anything the store throws at us; 500, detail stays in the logs.
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => {
                (StatusCode::BAD_REQUEST, Json(errors)).into_response()
            }
            ApiError::NotFound => StatusCode::NOT_FOUND.into_response(),
            ApiError::Internal(e) => {
                error!("request failed: {e:#}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Limit policy
// -----------------------------------------------------------------------------

/// Resolve the `limit` query parameter.
///
/// Absent, non-numeric, or unparsable values fall back to 20. Values above
/// 100 are clamped to 100. Values below 1 reset to the default 20 rather
/// than clamping to 1; this mirrors the long-standing behavior of the API
/// and is deliberate.
fn parse_limit(raw: Option<&str>) -> i64 {
    match raw.and_then(|s| s.trim().parse::<i64>().ok()) {
        Some(n) if n > MAX_LIMIT => MAX_LIMIT,
        Some(n) if n < 1 => DEFAULT_LIMIT,
        Some(n) => n,
        None => DEFAULT_LIMIT,
    }
}

/// `limit` is taken as raw text so a non-numeric value falls back to the
/// default instead of rejecting the request.
#[derive(Debug, Deserialize)]
struct ChatQuery {
    limit: Option<String>,
}

// -----------------------------------------------------------------------------
// Handlers
// -----------------------------------------------------------------------------

/// POST /chats/ - create a chat.
/// Body: {"title": "string"}
async fn create_chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewChat>,
) -> Result<impl IntoResponse, ApiError> {
    let title = match payload.validate() {
        Ok(title) => title,
        Err(errors) => {
            state.journal.record(
                "create_chat",
                &format!("Chat validation failed: {errors:?}"),
                Sinks::both(),
            );
            return Err(ApiError::Validation(errors));
        }
    };

    let chat = Chat::new(title);
    state.store.create_chat(&chat).await?;

    state.journal.record(
        "create_chat",
        &format!(
            "Created chat: title={} id={}",
            truncate(&chat.title, JOURNAL_PREVIEW_CHARS),
            chat.id
        ),
        Sinks::both(),
    );

    Ok((
        StatusCode::CREATED,
        Json(ChatView::from_chat(chat, Vec::new())),
    ))
}

/// GET /chats/{id}/ - fetch a chat with its most recent messages.
/// Query: limit (default 20, max 100)
async fn get_chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ChatQuery>,
) -> Result<Json<ChatView>, ApiError> {
    let chat = state.store.get_chat(&id).await?.ok_or(ApiError::NotFound)?;

    let limit = parse_limit(query.limit.as_deref());
    let messages = state.store.recent_messages(&chat.id, limit).await?;

    Ok(Json(ChatView::from_chat(chat, messages)))
}

/// DELETE /chats/{id}/ - delete a chat and all its messages.
async fn delete_chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let chat = state.store.get_chat(&id).await?.ok_or(ApiError::NotFound)?;

    state.journal.record(
        "delete_chat",
        &format!(
            "Deleting chat {}[{}] and all its messages",
            truncate(&chat.title, JOURNAL_PREVIEW_CHARS),
            chat.id
        ),
        Sinks::both(),
    );

    state.store.delete_chat(&chat.id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /chats/{id}/messages/ - post a message into a chat.
/// Body: {"text": "string"}
async fn create_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<NewMessage>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = state.store.get_chat(&id).await?.ok_or(ApiError::NotFound)?;

    let text = match payload.validate() {
        Ok(text) => text,
        Err(errors) => {
            state.journal.record(
                "create_message",
                &format!(
                    "Message validation failed in chat {}[{}]: {errors:?}",
                    truncate(&chat.title, JOURNAL_PREVIEW_CHARS),
                    chat.id
                ),
                Sinks::both(),
            );
            return Err(ApiError::Validation(errors));
        }
    };

    let msg = Message::new(chat.id.clone(), text);
    state.store.create_message(&msg).await?;

    state.journal.record(
        "create_message",
        &format!(
            "Created message {}[{}] in chat {}[{}]",
            truncate(&msg.text, JOURNAL_PREVIEW_CHARS),
            msg.id,
            truncate(&chat.title, JOURNAL_PREVIEW_CHARS),
            chat.id
        ),
        Sinks::both(),
    );

    Ok((StatusCode::CREATED, Json(MessageCreatedView::from(msg))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use chrono::{Duration, Utc};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn test_app() -> (tempfile::TempDir, Arc<AppState>, Router) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("test.db")).await.unwrap();
        store.init().await.unwrap();
        let journal = Journal::new(dir.path().join("logs.log"));
        let state = Arc::new(AppState { store, journal });
        let app = router(state.clone());
        (dir, state, app)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn delete(uri: &str) -> Request<Body> {
        Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create_test_chat(app: &Router, title: &str) -> String {
        let response = app
            .clone()
            .oneshot(post_json("/chats/", json!({ "title": title })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["id"].as_str().unwrap().to_string()
    }

    #[test]
    fn limit_policy() {
        assert_eq!(parse_limit(None), 20);
        assert_eq!(parse_limit(Some("abc")), 20);
        assert_eq!(parse_limit(Some("")), 20);
        assert_eq!(parse_limit(Some("0")), 20);
        assert_eq!(parse_limit(Some("-5")), 20);
        assert_eq!(parse_limit(Some("1")), 1);
        assert_eq!(parse_limit(Some("50")), 50);
        assert_eq!(parse_limit(Some("100")), 100);
        assert_eq!(parse_limit(Some("101")), 100);
        assert_eq!(parse_limit(Some("500")), 100);
        // surrounding whitespace is tolerated, whitespace alone is not
        assert_eq!(parse_limit(Some(" 5 ")), 5);
        assert_eq!(parse_limit(Some("   ")), 20);
    }

    #[tokio::test]
    async fn create_chat_returns_trimmed_title_and_empty_messages() {
        let (_dir, _state, app) = test_app().await;

        let response = app
            .oneshot(post_json("/chats/", json!({ "title": "  Test Chat  " })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let data = body_json(response).await;
        assert_eq!(data["title"], "Test Chat");
        assert_eq!(data["messages"], json!([]));
        assert!(data["id"].is_string());
        assert!(data["created_at"].is_string());
    }

    #[tokio::test]
    async fn create_chat_with_blank_title_persists_nothing() {
        let (_dir, state, app) = test_app().await;

        let response = app
            .oneshot(post_json("/chats/", json!({ "title": "   " })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let errors = body_json(response).await;
        assert!(errors["title"].is_string());
        assert_eq!(state.store.count_chats().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn create_chat_with_missing_title_is_a_field_error() {
        let (_dir, state, app) = test_app().await;

        let response = app.oneshot(post_json("/chats/", json!({}))).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.store.count_chats().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn create_message_omits_chat_field() {
        let (_dir, _state, app) = test_app().await;
        let chat_id = create_test_chat(&app, "Chat for message").await;

        let response = app
            .oneshot(post_json(
                &format!("/chats/{chat_id}/messages/"),
                json!({ "text": "  Hello world!  " }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let data = body_json(response).await;
        assert_eq!(data["text"], "Hello world!");
        assert!(data.get("chat").is_none());
    }

    #[tokio::test]
    async fn create_message_in_missing_chat_is_404() {
        let (_dir, _state, app) = test_app().await;

        let response = app
            .oneshot(post_json(
                "/chats/no-such-chat/messages/",
                json!({ "text": "Hello" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_message_with_blank_text_persists_nothing() {
        let (_dir, state, app) = test_app().await;
        let chat_id = create_test_chat(&app, "Chat").await;

        let response = app
            .oneshot(post_json(
                &format!("/chats/{chat_id}/messages/"),
                json!({ "text": "\n  " }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let errors = body_json(response).await;
        assert!(errors["text"].is_string());
        assert_eq!(state.store.count_messages(&chat_id).await.unwrap(), 0);
    }

    // Seed a chat with messages carrying strictly increasing timestamps.
    async fn seed_messages(state: &AppState, chat_id: &str, count: usize) {
        let base = Utc::now();
        for i in 0..count {
            let msg = Message {
                id: format!("msg-{i}"),
                chat_id: chat_id.to_string(),
                text: format!("msg {i}"),
                created_at: base + Duration::seconds(i as i64),
            };
            state.store.create_message(&msg).await.unwrap();
        }
    }

    #[tokio::test]
    async fn get_chat_returns_bounded_recent_messages_newest_first() {
        let (_dir, state, app) = test_app().await;
        let chat_id = create_test_chat(&app, "Chat for get").await;
        seed_messages(&state, &chat_id, 5).await;

        let response = app
            .oneshot(get(&format!("/chats/{chat_id}/?limit=3")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let data = body_json(response).await;
        assert_eq!(data["id"], chat_id.as_str());

        let texts: Vec<&str> = data["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["text"].as_str().unwrap())
            .collect();
        assert_eq!(texts, ["msg 4", "msg 3", "msg 2"]);

        for msg in data["messages"].as_array().unwrap() {
            assert_eq!(msg["chat"], chat_id.as_str());
        }
    }

    #[tokio::test]
    async fn limit_fallbacks_and_clamping_over_http() {
        let (_dir, state, app) = test_app().await;
        let chat_id = create_test_chat(&app, "Chat with history").await;
        seed_messages(&state, &chat_id, 25).await;

        // omitted, non-numeric, and <1 all behave as limit=20
        for uri in [
            format!("/chats/{chat_id}/"),
            format!("/chats/{chat_id}/?limit=abc"),
            format!("/chats/{chat_id}/?limit=0"),
            format!("/chats/{chat_id}/?limit=-3"),
        ] {
            let response = app.clone().oneshot(get(&uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let data = body_json(response).await;
            assert_eq!(data["messages"].as_array().unwrap().len(), 20, "{uri}");
        }

        // >100 clamps to 100, which covers all 25
        let response = app
            .oneshot(get(&format!("/chats/{chat_id}/?limit=500")))
            .await
            .unwrap();
        let data = body_json(response).await;
        assert_eq!(data["messages"].as_array().unwrap().len(), 25);
    }

    #[tokio::test]
    async fn get_missing_chat_is_404() {
        let (_dir, _state, app) = test_app().await;

        let response = app.oneshot(get("/chats/no-such-chat/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_chat_cascades_and_returns_204() {
        let (_dir, state, app) = test_app().await;
        let chat_id = create_test_chat(&app, "Chat for delete").await;
        seed_messages(&state, &chat_id, 2).await;

        let response = app
            .clone()
            .oneshot(delete(&format!("/chats/{chat_id}/")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());

        assert!(state.store.get_chat(&chat_id).await.unwrap().is_none());
        assert_eq!(state.store.count_messages(&chat_id).await.unwrap(), 0);

        let response = app
            .oneshot(get(&format!("/chats/{chat_id}/")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_missing_chat_is_404() {
        let (_dir, _state, app) = test_app().await;

        let response = app.oneshot(delete("/chats/no-such-chat/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
