// src/handlers/generate.rs
use crate::error::{ApiResult, AppError};
use crate::handlers::account::load_active_user;
use crate::handlers::chat::{insert_message, load_messages, load_owned_chat, parse_chat_id};
use crate::middleware::auth::{auth_middleware, require_user_id};
use crate::middleware::rate_limit::rate_limit_middleware;
use crate::models::auth::Claims;
use crate::models::chat::{GenerateRequest, GenerateResponse, MessageRole};
use crate::openai_client::{GenerationError, TextGenerator};
use crate::services::chat_context::{build_conversation, AttachedFile};
use crate::services::quota::{self, QuotaKind};
use crate::AppState;
use axum::{
    extract::Extension,
    response::Json,
    routing::post,
    Router,
};
use std::sync::Arc;

pub const EMPTY_REPLY: &str = "No response generated.";

pub fn generate_routes() -> Router {
    Router::new()
        .route("/api/generate", post(generate))
        .layer(axum::middleware::from_fn(rate_limit_middleware))
        .layer(axum::middleware::from_fn(auth_middleware))
}

/// The body is read as text so malformed JSON gets its own message.
pub fn parse_generate_body(raw: &str) -> Result<(String, String), AppError> {
    let body: GenerateRequest = serde_json::from_str(raw).map_err(|e| {
        tracing::warn!("⚠️ Invalid JSON: {}", e);
        AppError::BadRequest("Invalid JSON body".to_string())
    })?;

    match (body.prompt, body.chat_id) {
        (Some(prompt), Some(chat_id)) if !prompt.trim().is_empty() && !chat_id.trim().is_empty() => {
            Ok((prompt, chat_id.trim().to_string()))
        }
        _ => Err(AppError::BadRequest("Missing prompt or chatId".to_string())),
    }
}

/// The generation client, or a 500 when no API key was configured.
pub fn require_generator(state: &AppState) -> Result<&Arc<dyn TextGenerator>, AppError> {
    state
        .generator
        .as_ref()
        .ok_or_else(|| AppError::Internal("OPENAI_API_KEY is not configured".to_string()))
}

/// An empty completion is answered with a placeholder, not an error.
pub fn reply_or_placeholder(result: Result<String, GenerationError>) -> Result<String, GenerationError> {
    match result {
        Ok(text) if !text.trim().is_empty() => Ok(text),
        Ok(_) | Err(GenerationError::EmptyCompletion) => Ok(EMPTY_REPLY.to_string()),
        Err(e) => Err(e),
    }
}

async fn generate(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    body: String,
) -> ApiResult<GenerateResponse> {
    let user_id = require_user_id(&claims)?;
    let (prompt, chat_id) = parse_generate_body(&body)?;

    tracing::info!("💬 Prompt received for chat {} ({} chars)", chat_id, prompt.chars().count());

    let chat_id = parse_chat_id(&chat_id)?;
    let chat = load_owned_chat(&state.db_pool, chat_id, user_id).await?;
    let generator = require_generator(&state)?;

    load_active_user(&state, user_id).await?;
    quota::enforce(&state.db_pool, user_id, QuotaKind::Message).await?;

    let history = load_messages(&state.db_pool, chat_id).await?;
    let file = chat.file_content.as_deref().map(|content| AttachedFile {
        name: chat.file_name.as_deref(),
        content,
    });
    if let Some(file) = &file {
        tracing::info!("📄 Using file content from {}", file.name.unwrap_or("unknown file"));
    }

    let messages = build_conversation(&history, &prompt, file.as_ref());
    let reply = reply_or_placeholder(generator.complete(messages).await)?;

    insert_message(&state.db_pool, chat_id, MessageRole::Assistant, &reply).await?;
    tracing::info!("✅ Reply stored for chat {} ({} chars)", chat_id, reply.chars().count());

    Ok(Json(GenerateResponse { ok: true, result: reply }))
}
