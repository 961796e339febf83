// src/handlers/chat.rs
use crate::error::{ApiResult, AppError};
use crate::extract::{JsonBody, PathParams, QueryParams};
use crate::middleware::auth::{auth_middleware, require_user_id};
use crate::models::auth::Claims;
use crate::models::chat::{Chat, ChatMessage, CreateChatRequest, CreateMessageRequest, MessageRole, CHAT_COLUMNS};
use crate::AppState;
use axum::{
    extract::Extension,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;
const UNTITLED_CHAT: &str = "Untitled Chat";

pub fn chat_routes() -> Router {
    Router::new()
        .route("/api/chats", get(list_chats).post(create_chat))
        .route("/api/chats/:id", get(get_chat).delete(delete_chat))
        .route("/api/chats/:id/messages", post(add_message))
        .route("/api/chats/:id/messages/:message_id", delete(delete_message))
        .layer(axum::middleware::from_fn(auth_middleware))
}

#[derive(Debug, Deserialize)]
pub struct ChatListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl ChatListQuery {
    /// (page, limit, offset) with page >= 1 and limit in 1..=100.
    fn window(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        (page, limit, (page - 1) * limit)
    }
}

#[derive(Debug, FromRow)]
struct ChatSummaryRow {
    id: Uuid,
    title: String,
    file_name: Option<String>,
    created_at: DateTime<Utc>,
    message_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ChatSummary {
    pub id: Uuid,
    pub title: String,
    pub file_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub message_count: i64,
    pub date_group: String,
}

/// Sidebar grouping: "Today", "Yesterday", else the day as dd/mm/yyyy.
pub fn date_group(created_at: DateTime<Utc>, today: NaiveDate) -> String {
    let day = created_at.date_naive();
    if day == today {
        "Today".to_string()
    } else if day == today - Duration::days(1) {
        "Yesterday".to_string()
    } else {
        day.format("%d/%m/%Y").to_string()
    }
}

/// A chat id from a request body or form. Anything that is not a UUID
/// cannot name a chat, so it is a 404 like an unknown id.
pub fn parse_chat_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::NotFound("Chat not found".to_string()))
}

/// The chat, if it exists and belongs to `user_id`. Someone else's chat is
/// reported exactly like a missing one.
pub async fn load_owned_chat(pool: &PgPool, chat_id: Uuid, user_id: i32) -> Result<Chat, AppError> {
    sqlx::query_as::<_, Chat>(&format!(
        "SELECT {} FROM chats WHERE id = $1 AND user_id = $2",
        CHAT_COLUMNS
    ))
    .bind(chat_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Chat not found".to_string()))
}

/// Messages of a chat, oldest first.
pub async fn load_messages(pool: &PgPool, chat_id: Uuid) -> Result<Vec<ChatMessage>, sqlx::Error> {
    sqlx::query_as::<_, ChatMessage>(
        "SELECT id, chat_id, role, text, created_at FROM chat_messages
         WHERE chat_id = $1 ORDER BY created_at ASC, id ASC",
    )
    .bind(chat_id)
    .fetch_all(pool)
    .await
}

pub async fn insert_message(
    pool: &PgPool,
    chat_id: Uuid,
    role: MessageRole,
    text: &str,
) -> Result<ChatMessage, sqlx::Error> {
    sqlx::query_as::<_, ChatMessage>(
        "INSERT INTO chat_messages (id, chat_id, role, text, created_at)
         VALUES ($1, $2, $3, $4, NOW())
         RETURNING id, chat_id, role, text, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(chat_id)
    .bind(role.as_str())
    .bind(text)
    .fetch_one(pool)
    .await
}

async fn list_chats(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    QueryParams(params): QueryParams<ChatListQuery>,
) -> ApiResult<serde_json::Value> {
    let user_id = require_user_id(&claims)?;
    let (page, limit, offset) = params.window();

    let rows = sqlx::query_as::<_, ChatSummaryRow>(
        "SELECT c.id, c.title, c.file_name, c.created_at, COUNT(m.id) AS message_count
         FROM chats c
         LEFT JOIN chat_messages m ON m.chat_id = c.id
         WHERE c.user_id = $1
         GROUP BY c.id
         ORDER BY c.created_at DESC
         LIMIT $2 OFFSET $3",
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db_pool)
    .await?;

    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chats WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&state.db_pool)
        .await?;

    let today = Utc::now().date_naive();
    let chats: Vec<ChatSummary> = rows
        .into_iter()
        .map(|row| ChatSummary {
            date_group: date_group(row.created_at, today),
            id: row.id,
            title: row.title,
            file_name: row.file_name,
            created_at: row.created_at,
            message_count: row.message_count,
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "chats": chats,
        "pagination": {
            "page": page,
            "limit": limit,
            "total": total,
            "total_pages": (total + limit - 1) / limit,
            "has_more": offset + limit < total
        }
    })))
}

async fn create_chat(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    JsonBody(payload): JsonBody<CreateChatRequest>,
) -> ApiResult<serde_json::Value> {
    let user_id = require_user_id(&claims)?;
    let title = payload
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNTITLED_CHAT);

    let chat = sqlx::query_as::<_, Chat>(&format!(
        "INSERT INTO chats (id, user_id, title, created_at) VALUES ($1, $2, $3, NOW()) RETURNING {}",
        CHAT_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(title)
    .fetch_one(&state.db_pool)
    .await?;

    tracing::info!("💬 Created chat {} for user {}", chat.id, user_id);

    Ok(Json(json!({ "success": true, "chat": chat })))
}

async fn get_chat(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    PathParams(chat_id): PathParams<Uuid>,
) -> ApiResult<serde_json::Value> {
    let user_id = require_user_id(&claims)?;
    let chat = load_owned_chat(&state.db_pool, chat_id, user_id).await?;
    let messages = load_messages(&state.db_pool, chat_id).await?;

    Ok(Json(json!({
        "success": true,
        "chat": chat,
        "messages": messages
    })))
}

async fn delete_chat(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    PathParams(chat_id): PathParams<Uuid>,
) -> ApiResult<serde_json::Value> {
    let user_id = require_user_id(&claims)?;

    // chat_messages rows go with it (ON DELETE CASCADE)
    let result = sqlx::query("DELETE FROM chats WHERE id = $1 AND user_id = $2")
        .bind(chat_id)
        .bind(user_id)
        .execute(&state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Chat not found".to_string()));
    }

    tracing::info!("🗑️ Deleted chat {} for user {}", chat_id, user_id);

    Ok(Json(json!({ "success": true, "message": "Chat deleted" })))
}

async fn add_message(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    PathParams(chat_id): PathParams<Uuid>,
    JsonBody(payload): JsonBody<CreateMessageRequest>,
) -> ApiResult<serde_json::Value> {
    let user_id = require_user_id(&claims)?;

    let role = match payload.role.as_deref() {
        None => MessageRole::User,
        Some(role) => MessageRole::parse(role)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown message role '{}'", role)))?,
    };

    if payload.text.trim().is_empty() {
        return Err(AppError::BadRequest("Message text is required".to_string()));
    }

    load_owned_chat(&state.db_pool, chat_id, user_id).await?;
    let message = insert_message(&state.db_pool, chat_id, role, &payload.text).await?;

    Ok(Json(json!({ "success": true, "message": message })))
}

/// Lets a client roll back a message after aborting a generation.
async fn delete_message(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    PathParams((chat_id, message_id)): PathParams<(Uuid, Uuid)>,
) -> ApiResult<serde_json::Value> {
    let user_id = require_user_id(&claims)?;
    load_owned_chat(&state.db_pool, chat_id, user_id).await?;

    let result = sqlx::query("DELETE FROM chat_messages WHERE id = $1 AND chat_id = $2")
        .bind(message_id)
        .bind(chat_id)
        .execute(&state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Message not found".to_string()));
    }

    Ok(Json(json!({ "success": true, "message": "Message deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::auth::generate_jwt_token;
    use crate::models::auth::User;
    use crate::models::subscription::SubscriptionStatus;
    use crate::test_support::test_state;
    use axum::{body::Body, extract::Request, http::StatusCode};
    use chrono::TimeZone;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn send(method: &str, uri: &str, body: &'static str) -> (StatusCode, serde_json::Value) {
        let token = generate_jwt_token(&User::sample(SubscriptionStatus::Trial), "test_secret", 1).unwrap();
        let response = chat_routes()
            .layer(Extension(test_state()))
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("authorization", format!("Bearer {}", token))
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_malformed_chat_body_is_json_bad_request() {
        let (status, body) = send("POST", "/api/chats", "{oops").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Invalid JSON body");
    }

    #[tokio::test]
    async fn test_non_uuid_chat_path_is_json_not_found() {
        let (status, body) = send("GET", "/api/chats/not-a-uuid", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (status, _) = send("DELETE", &format!("/api/chats/{}/messages/42", Uuid::new_v4()), "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_page_number_is_json_bad_request() {
        let (status, body) = send("GET", "/api/chats?page=two", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[test]
    fn test_date_group_labels() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();

        let this_morning = Utc.with_ymd_and_hms(2024, 3, 10, 0, 5, 0).unwrap();
        assert_eq!(date_group(this_morning, today), "Today");

        let last_night = Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 0).unwrap();
        assert_eq!(date_group(last_night, today), "Yesterday");

        let earlier = Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap();
        assert_eq!(date_group(earlier, today), "29/02/2024");
    }

    #[test]
    fn test_parse_chat_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_chat_id(&format!(" {} ", id)).unwrap(), id);
        assert!(matches!(parse_chat_id("not-a-uuid"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_pagination_window() {
        let defaults = ChatListQuery { page: None, limit: None };
        assert_eq!(defaults.window(), (1, 20, 0));

        let third = ChatListQuery { page: Some(3), limit: Some(10) };
        assert_eq!(third.window(), (3, 10, 20));

        let clamped = ChatListQuery { page: Some(0), limit: Some(500) };
        assert_eq!(clamped.window(), (1, 100, 0));
    }
}
